use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use super::{Resolver, TrackMetadata, YtDlp};

pub struct SoundCloudResolver {
    ytdlp: YtDlp,
}

impl SoundCloudResolver {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }
}

#[async_trait]
impl Resolver for SoundCloudResolver {
    fn name(&self) -> &'static str {
        "SoundCloud"
    }

    fn color(&self) -> u32 {
        0xFF5500
    }

    fn matches(&self, reference: &str) -> bool {
        let Ok(url) = Url::parse(reference) else {
            return false;
        };
        matches!(
            url.host_str(),
            Some("soundcloud.com" | "www.soundcloud.com" | "m.soundcloud.com" | "on.soundcloud.com")
        )
    }

    async fn fetch_metadata(&self, reference: &str) -> Result<TrackMetadata> {
        self.ytdlp.fetch(reference).await
    }

    async fn fetch_playlist(&self, reference: &str, limit: usize) -> Result<Vec<TrackMetadata>> {
        // Los sets son listas de reproducción
        if reference.contains("/sets/") {
            self.ytdlp.fetch_playlist(reference, limit).await
        } else {
            Ok(vec![self.fetch_metadata(reference).await?])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_soundcloud_url_detection() {
        let soundcloud = SoundCloudResolver::new(YtDlp::new("yt-dlp", Duration::from_secs(1)));
        assert!(soundcloud.matches("https://soundcloud.com/artist/track"));
        assert!(soundcloud.matches("https://m.soundcloud.com/artist/sets/album"));
        assert!(!soundcloud.matches("https://notsoundcloud.com.evil.io/x"));
        assert!(!soundcloud.matches("soundcloud track"));
    }
}
