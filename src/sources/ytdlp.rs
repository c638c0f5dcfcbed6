use anyhow::{Context, Result};
use async_process::Command;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::TrackMetadata;

/// Ejecutor compartido de yt-dlp con límite de tiempo por llamada
#[derive(Debug, Clone)]
pub struct YtDlp {
    path: String,
    timeout: Duration,
}

/// Información extraída de yt-dlp (`--dump-json`)
#[derive(Debug, Deserialize)]
pub struct YtDlpInfo {
    pub title: String,
    pub webpage_url: Option<String>,
    /// URL del formato seleccionado con `-f`
    pub url: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
    pub uploader_url: Option<String>,
    pub artist: Option<String>,
    pub is_live: Option<bool>,
}

/// Entrada de `--flat-playlist`
#[derive(Debug, Deserialize)]
pub struct FlatEntry {
    pub url: Option<String>,
    pub webpage_url: Option<String>,
    pub title: Option<String>,
}

impl FlatEntry {
    pub fn reference(&self) -> Option<&str> {
        self.webpage_url.as_deref().or(self.url.as_deref())
    }
}

impl YtDlpInfo {
    /// Convierte la respuesta en metadata; `reference` se usa si no hay `webpage_url`
    pub fn into_metadata(self, reference: &str) -> Result<TrackMetadata> {
        let stream_url = self
            .url
            .filter(|u| !u.is_empty())
            .context("yt-dlp no devolvió URL de stream")?;

        let page = self.webpage_url.unwrap_or_else(|| reference.to_string());
        let mut metadata = TrackMetadata::new(self.title, page).with_stream_url(stream_url);

        if let Some(duration) = self.duration.filter(|d| d.is_finite() && *d > 0.0) {
            metadata = metadata.with_duration(Duration::from_secs_f64(duration));
        }
        if let Some(thumbnail) = self.thumbnail {
            metadata = metadata.with_thumbnail(thumbnail);
        }
        if let Some(artist) = self.artist.or(self.uploader) {
            metadata = metadata.with_artist(artist, self.uploader_url);
        }

        Ok(metadata)
    }
}

impl YtDlp {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Metadata de un único track con su URL de audio
    pub async fn fetch(&self, url: &str) -> Result<TrackMetadata> {
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "-f",
                "bestaudio/best",
                "--no-warnings",
                url,
            ])
            .await?;

        let info: YtDlpInfo =
            serde_json::from_str(stdout.trim()).context("Error al parsear respuesta de yt-dlp")?;

        info.into_metadata(url)
    }

    /// Entradas de una playlist sin resolver (máximo `limit`)
    pub async fn flat_playlist(&self, url: &str, limit: usize) -> Result<Vec<FlatEntry>> {
        info!("📋 Obteniendo playlist: {}", url);

        let limit = limit.to_string();
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--playlist-end",
                &limit,
                "--no-warnings",
                url,
            ])
            .await?;

        Ok(parse_flat_entries(&stdout))
    }

    /// Resuelve cada entrada de la playlist; las que fallan se omiten
    pub async fn fetch_playlist(&self, url: &str, limit: usize) -> Result<Vec<TrackMetadata>> {
        let entries = self.flat_playlist(url, limit).await?;
        let mut tracks = Vec::with_capacity(entries.len());

        for entry in entries.iter().take(limit) {
            let Some(reference) = entry.reference() else {
                continue;
            };
            match self.fetch(reference).await {
                Ok(metadata) => tracks.push(metadata),
                Err(e) => debug!(
                    "⏭️ Entrada omitida ({}): {:#}",
                    entry.title.as_deref().unwrap_or(reference),
                    e
                ),
            }
        }

        Ok(tracks)
    }

    pub async fn version(&self) -> Result<String> {
        let stdout = self.run(&["--version"]).await?;
        Ok(stdout.trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.path).args(args).kill_on_drop(true).output(),
        )
        .await
        .with_context(|| format!("yt-dlp excedió {}", humantime::format_duration(self.timeout)))?
        .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_flat_entries(stdout: &str) -> Vec<FlatEntry> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<FlatEntry>(line).ok())
        .collect()
}
