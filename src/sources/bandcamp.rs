use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use super::{Resolver, TrackMetadata, YtDlp};

pub struct BandcampResolver {
    ytdlp: YtDlp,
}

impl BandcampResolver {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }
}

#[async_trait]
impl Resolver for BandcampResolver {
    fn name(&self) -> &'static str {
        "Bandcamp"
    }

    fn color(&self) -> u32 {
        0x1DA0C3
    }

    /// `<artista>.bandcamp.com/track/...` o `/album/...`
    fn matches(&self, reference: &str) -> bool {
        let Ok(url) = Url::parse(reference) else {
            return false;
        };
        let host_ok = url
            .host_str()
            .is_some_and(|host| host.ends_with(".bandcamp.com"));
        host_ok && (url.path().starts_with("/track/") || url.path().starts_with("/album/"))
    }

    async fn fetch_metadata(&self, reference: &str) -> Result<TrackMetadata> {
        self.ytdlp.fetch(reference).await
    }

    async fn fetch_playlist(&self, reference: &str, limit: usize) -> Result<Vec<TrackMetadata>> {
        if reference.contains("/album/") {
            self.ytdlp.fetch_playlist(reference, limit).await
        } else {
            Ok(vec![self.fetch_metadata(reference).await?])
        }
    }
}
