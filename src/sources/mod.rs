//! # Sources Module
//!
//! Metadata resolution for everything the bot can play.
//!
//! Each streaming platform is a [`Resolver`]: it recognises references it
//! owns and turns them into [`TrackMetadata`] with a playable stream URL.
//! The [`ResolverRegistry`] keeps resolvers in a fixed order and hands a
//! reference to the **first** one that matches; a failure from that resolver
//! is final, later resolvers are never consulted.
//!
//! ## Registration order
//!
//! | Order | Resolver | Matches |
//! |-------|----------|---------|
//! | 1 | [`YouTubeResolver`] | youtube.com, youtu.be, music.youtube.com |
//! | 2 | [`SoundCloudResolver`] | soundcloud.com |
//! | 3 | [`BandcampResolver`] | *.bandcamp.com tracks and albums |
//! | 4 | [`DirectUrlResolver`] | any http(s) URL with an audio stream |
//!
//! The direct URL probe must stay last: it accepts almost any URL and would
//! otherwise shadow platform pages it cannot stream correctly.

pub mod bandcamp;
pub mod direct_url;
pub mod soundcloud;
pub mod youtube;
pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::UserId;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use bandcamp::BandcampResolver;
pub use direct_url::DirectUrlResolver;
pub use soundcloud::SoundCloudResolver;
pub use youtube::YouTubeResolver;
pub use ytdlp::YtDlp;

use crate::{audio::queue::QueueEntry, config::Config, error::ResolutionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub name: String,
    pub url: Option<String>,
}

/// Metadata reproducible de un track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    /// URL que se muestra al usuario
    pub url: String,
    /// URL que consume el codificador
    pub stream_url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub artists: Vec<Artist>,
}

impl TrackMetadata {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            title: title.into(),
            stream_url: url.clone(),
            url,
            duration: None,
            thumbnail: None,
            artists: Vec::new(),
        }
    }

    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.stream_url = stream_url.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_artist(mut self, name: impl Into<String>, url: Option<String>) -> Self {
        self.artists.push(Artist {
            name: name.into(),
            url,
        });
        self
    }

    /// Nombres de artistas separados por coma
    pub fn artist_names(&self) -> Option<String> {
        if self.artists.is_empty() {
            return None;
        }
        Some(
            self.artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

/// Trait común para todas las fuentes de música
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Nombre de la fuente
    fn name(&self) -> &'static str;

    /// Color RGB con el que se muestra la fuente
    fn color(&self) -> u32;

    /// Verifica si la referencia pertenece a esta fuente
    fn matches(&self, reference: &str) -> bool;

    async fn fetch_metadata(&self, reference: &str) -> Result<TrackMetadata>;

    /// Tracks de una playlist; por defecto la referencia es un solo track
    async fn fetch_playlist(&self, reference: &str, limit: usize) -> Result<Vec<TrackMetadata>> {
        let _ = limit;
        Ok(vec![self.fetch_metadata(reference).await?])
    }
}

/// Lista ordenada de fuentes
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn Resolver>>,
    max_playlist_size: usize,
}

impl ResolverRegistry {
    pub fn new(max_playlist_size: usize) -> Self {
        Self {
            resolvers: Vec::new(),
            max_playlist_size,
        }
    }

    /// Registro de producción; la sonda de URL directa va al final
    pub fn with_defaults(config: &Config) -> Result<Self> {
        let ytdlp = YtDlp::new(config.ytdlp_path.clone(), config.resolver_timeout);

        Ok(Self::new(config.max_playlist_size)
            .register(YouTubeResolver::new(ytdlp.clone())?)
            .register(SoundCloudResolver::new(ytdlp.clone()))
            .register(BandcampResolver::new(ytdlp))
            .register(DirectUrlResolver::new(
                config.ffprobe_path.clone(),
                config.resolver_timeout,
            )))
    }

    pub fn register(mut self, resolver: impl Resolver + 'static) -> Self {
        info!("🔌 Fuente registrada: {}", resolver.name());
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Primera fuente cuya prueba acepta la referencia
    pub fn resolver_for(&self, reference: &str) -> Option<&dyn Resolver> {
        self.resolvers
            .iter()
            .find(|r| r.matches(reference))
            .map(|r| r.as_ref())
    }

    pub async fn create_queue_entry(
        &self,
        reference: &str,
        requested_by: UserId,
    ) -> Result<QueueEntry, ResolutionError> {
        let resolver = self.matching(reference)?;

        let metadata = resolver
            .fetch_metadata(reference)
            .await
            .map_err(|e| Self::fetch_failed(resolver, e))?;

        Ok(QueueEntry::new(
            metadata,
            resolver.name(),
            resolver.color(),
            requested_by,
        ))
    }

    /// Igual que [`Self::create_queue_entry`] pero expande playlists
    pub async fn create_queue_entries(
        &self,
        reference: &str,
        requested_by: UserId,
    ) -> Result<Vec<QueueEntry>, ResolutionError> {
        let resolver = self.matching(reference)?;

        let tracks = resolver
            .fetch_playlist(reference, self.max_playlist_size)
            .await
            .map_err(|e| Self::fetch_failed(resolver, e))?;

        if tracks.is_empty() {
            return Err(ResolutionError::FetchFailed {
                resolver: resolver.name(),
                reason: "la playlist está vacía".to_string(),
            });
        }

        Ok(tracks
            .into_iter()
            .take(self.max_playlist_size)
            .map(|metadata| {
                QueueEntry::new(metadata, resolver.name(), resolver.color(), requested_by)
            })
            .collect())
    }

    fn matching(&self, reference: &str) -> Result<&dyn Resolver, ResolutionError> {
        let resolver = self.resolver_for(reference).ok_or_else(|| {
            debug!("Ninguna fuente reconoce: {}", reference);
            ResolutionError::NoResolverMatched(reference.to_string())
        })?;
        debug!("🔎 {} resolverá {}", resolver.name(), reference);
        Ok(resolver)
    }

    fn fetch_failed(resolver: &dyn Resolver, error: anyhow::Error) -> ResolutionError {
        warn!("❌ {} falló: {:#}", resolver.name(), error);
        ResolutionError::FetchFailed {
            resolver: resolver.name(),
            reason: format!("{:#}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mock(name: &'static str, matches: bool) -> MockResolver {
        let mut resolver = MockResolver::new();
        resolver.expect_name().return_const(name);
        resolver.expect_color().return_const(0x123456u32);
        resolver.expect_matches().return_const(matches);
        resolver
    }

    #[tokio::test]
    async fn test_first_match_is_used_exclusively() {
        let mut first = mock("first", true);
        first
            .expect_fetch_metadata()
            .times(1)
            .returning(|r| Ok(TrackMetadata::new("uno", r)));

        let mut second = MockResolver::new();
        second.expect_name().return_const("second");
        second.expect_matches().never();
        second.expect_fetch_metadata().never();

        let registry = ResolverRegistry::new(10).register(first).register(second);
        let entry = registry
            .create_queue_entry("https://example.com/a", UserId::new(7))
            .await
            .unwrap();

        assert_eq!(entry.source_name, "first");
        assert_eq!(entry.source_color, 0x123456);
        assert_eq!(entry.requested_by, UserId::new(7));
        assert_eq!(entry.metadata.url, "https://example.com/a");
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_fall_through() {
        let mut first = mock("first", true);
        first
            .expect_fetch_metadata()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("HTTP 403")));

        let mut fallback = MockResolver::new();
        fallback.expect_name().return_const("fallback");
        fallback.expect_matches().never();
        fallback.expect_fetch_metadata().never();

        let registry = ResolverRegistry::new(10).register(first).register(fallback);
        let err = registry
            .create_queue_entry("https://example.com/a", UserId::new(1))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ResolutionError::FetchFailed {
                resolver: "first",
                reason: "HTTP 403".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_skips_non_matching_resolvers_in_order() {
        let mut youtube = mock("youtube", false);
        youtube.expect_fetch_metadata().never();

        let mut direct = mock("direct", true);
        direct
            .expect_fetch_metadata()
            .times(1)
            .returning(|r| Ok(TrackMetadata::new("archivo", r)));

        let registry = ResolverRegistry::new(10).register(youtube).register(direct);
        let entry = registry
            .create_queue_entry("https://cdn.example.com/song.mp3", UserId::new(1))
            .await
            .unwrap();

        assert_eq!(entry.source_name, "direct");
    }

    #[tokio::test]
    async fn test_no_resolver_matched() {
        let registry = ResolverRegistry::new(10).register(mock("youtube", false));
        let err = registry
            .create_queue_entry("not a url", UserId::new(1))
            .await
            .unwrap_err();

        assert_eq!(err, ResolutionError::NoResolverMatched("not a url".to_string()));
    }

    #[tokio::test]
    async fn test_playlist_is_truncated() {
        let mut resolver = mock("youtube", true);
        resolver.expect_fetch_playlist().times(1).returning(|_, _| {
            Ok((0..5)
                .map(|i| TrackMetadata::new(format!("t{i}"), format!("https://yt/{i}")))
                .collect())
        });

        let registry = ResolverRegistry::new(3).register(resolver);
        let entries = registry
            .create_queue_entries("https://youtube.com/playlist?list=x", UserId::new(1))
            .await
            .unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].title(), "t0");
    }

    #[test]
    fn test_artist_names() {
        let metadata = TrackMetadata::new("t", "u")
            .with_artist("A", None)
            .with_artist("B", Some("https://b".into()));
        assert_eq!(metadata.artist_names().as_deref(), Some("A, B"));
        assert_eq!(TrackMetadata::new("t", "u").artist_names(), None);
    }
}
