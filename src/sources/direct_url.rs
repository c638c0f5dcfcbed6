use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use tracing::debug;
use url::Url;

use super::{Resolver, TrackMetadata};

/// Cualquier URL http(s) con un stream de audio, verificado con ffprobe
pub struct DirectUrlResolver {
    ffprobe_path: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

impl DirectUrlResolver {
    pub fn new(ffprobe_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout,
        }
    }

    async fn probe(&self, url: &str) -> Result<ProbeOutput> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.ffprobe_path)
                .args([
                    "-v",
                    "quiet",
                    "-print_format",
                    "json",
                    "-show_format",
                    "-show_streams",
                    url,
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .with_context(|| format!("ffprobe excedió {}", humantime::format_duration(self.timeout)))?
        .context("Error al ejecutar ffprobe")?;

        if !output.status.success() {
            anyhow::bail!("ffprobe no pudo abrir la URL");
        }

        serde_json::from_slice(&output.stdout).context("Error al parsear respuesta de ffprobe")
    }
}

/// Busca una etiqueta sin distinguir mayúsculas
fn tag<'a>(tags: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.trim().is_empty())
        .map(|(_, v)| v.trim())
}

/// Último segmento no vacío de la ruta, o el host
fn title_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

fn into_metadata(url: &Url, probe: ProbeOutput) -> Result<TrackMetadata> {
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    if !has_audio {
        anyhow::bail!("la URL no contiene audio");
    }

    let format = probe.format;
    let tags = format.as_ref().map(|f| &f.tags);

    let title = tags
        .and_then(|t| tag(t, "title"))
        .map(str::to_string)
        .unwrap_or_else(|| title_from_url(url));

    let mut metadata = TrackMetadata::new(title, url.as_str());

    if let Some(duration) = format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
    {
        metadata = metadata.with_duration(Duration::from_secs_f64(duration));
    }

    if let Some(artist) = tags.and_then(|t| tag(t, "artist")) {
        metadata = metadata.with_artist(artist, None);
    }

    Ok(metadata)
}

#[async_trait]
impl Resolver for DirectUrlResolver {
    fn name(&self) -> &'static str {
        "URL directa"
    }

    fn color(&self) -> u32 {
        0x7289DA
    }

    fn matches(&self, reference: &str) -> bool {
        Url::parse(reference)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
            .unwrap_or(false)
    }

    async fn fetch_metadata(&self, reference: &str) -> Result<TrackMetadata> {
        let url = Url::parse(reference).context("URL inválida")?;
        debug!("🔗 Analizando URL directa: {}", url);

        let probe = self.probe(url.as_str()).await?;
        into_metadata(&url, probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolver() -> DirectUrlResolver {
        DirectUrlResolver::new("ffprobe", Duration::from_secs(1))
    }

    #[test]
    fn test_matches_http_only() {
        let direct = resolver();
        assert!(direct.matches("https://cdn.example.com/audio/song.mp3"));
        assert!(direct.matches("http://radio.example.org:8000/stream"));
        assert!(!direct.matches("ftp://example.com/song.mp3"));
        assert!(!direct.matches("never gonna give you up"));
    }

    #[test]
    fn test_metadata_from_tags() {
        let probe: ProbeOutput = serde_json::from_str(
            r#"{
                "streams": [{"codec_type": "audio"}],
                "format": {"duration": "183.5", "tags": {"TITLE": "Canción", "artist": "Banda"}}
            }"#,
        )
        .unwrap();
        let url = Url::parse("https://cdn.example.com/a/file.mp3").unwrap();

        let metadata = into_metadata(&url, probe).unwrap();
        assert_eq!(metadata.title, "Canción");
        assert_eq!(metadata.stream_url, "https://cdn.example.com/a/file.mp3");
        assert_eq!(metadata.duration, Some(Duration::from_secs_f64(183.5)));
        assert_eq!(metadata.artist_names().as_deref(), Some("Banda"));
    }

    #[test]
    fn test_title_falls_back_to_path() {
        let probe: ProbeOutput =
            serde_json::from_str(r#"{"streams": [{"codec_type": "audio"}]}"#).unwrap();
        let url = Url::parse("https://cdn.example.com/music/track01.ogg").unwrap();

        let metadata = into_metadata(&url, probe).unwrap();
        assert_eq!(metadata.title, "track01.ogg");
        assert_eq!(metadata.duration, None);
    }

    #[test]
    fn test_rejects_video_only() {
        let probe: ProbeOutput =
            serde_json::from_str(r#"{"streams": [{"codec_type": "video"}]}"#).unwrap();
        let url = Url::parse("https://cdn.example.com/clip.mp4").unwrap();

        assert!(into_metadata(&url, probe).is_err());
    }
}
