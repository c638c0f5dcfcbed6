use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use super::{Resolver, TrackMetadata, YtDlp};

/// Cliente para YouTube y YouTube Music vía yt-dlp
pub struct YouTubeResolver {
    ytdlp: YtDlp,
    url_pattern: Regex,
}

impl YouTubeResolver {
    pub fn new(ytdlp: YtDlp) -> Result<Self> {
        let url_pattern = Regex::new(
            r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?|embed/|v/|shorts/|playlist\?list=)|youtu\.be/|music\.youtube\.com/)",
        )?;
        Ok(Self { ytdlp, url_pattern })
    }

    fn is_playlist(reference: &str) -> bool {
        reference.contains("list=") && !reference.contains("watch?v=")
    }
}

#[async_trait]
impl Resolver for YouTubeResolver {
    fn name(&self) -> &'static str {
        "YouTube"
    }

    fn color(&self) -> u32 {
        0xFF0000
    }

    fn matches(&self, reference: &str) -> bool {
        self.url_pattern.is_match(reference)
    }

    async fn fetch_metadata(&self, reference: &str) -> Result<TrackMetadata> {
        self.ytdlp.fetch(reference).await
    }

    async fn fetch_playlist(&self, reference: &str, limit: usize) -> Result<Vec<TrackMetadata>> {
        if Self::is_playlist(reference) {
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

    fn resolver() -> YouTubeResolver {
        YouTubeResolver::new(YtDlp::new("yt-dlp", Duration::from_secs(1))).unwrap()
    }

    #[test]
    fn test_youtube_url_detection() {
        let youtube = resolver();
        assert!(youtube.matches("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(youtube.matches("https://youtu.be/dQw4w9WgXcQ"));
        assert!(youtube.matches("https://music.youtube.com/watch?v=test"));
        assert!(youtube.matches("https://www.youtube.com/playlist?list=PL123"));
        assert!(!youtube.matches("https://example.com/video"));
        assert!(!youtube.matches("https://soundcloud.com/artist/track"));
    }

    #[test]
    fn test_playlist_detection() {
        assert!(YouTubeResolver::is_playlist("https://www.youtube.com/playlist?list=PL123"));
        assert!(!YouTubeResolver::is_playlist(
            "https://www.youtube.com/watch?v=abc&list=PL123"
        ));
        assert!(!YouTubeResolver::is_playlist("https://youtu.be/abc"));
    }
}
