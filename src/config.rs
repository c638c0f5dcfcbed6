use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub opus_bitrate: u32,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Rendimiento
    pub worker_threads: usize,

    // Comportamiento de voz
    pub leave_on_queue_end: bool,
    pub self_deafen: bool,

    // Resolución de fuentes
    pub ytdlp_path: String,
    pub ffprobe_path: String,
    pub resolver_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una fuente de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let tools = ExternalTools::from_lookup(&lookup)?;
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .trim()
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: var("GUILD_ID").and_then(|s| s.trim().parse().ok()),

            // Audio
            default_volume: parse_or(var("DEFAULT_VOLUME"), "DEFAULT_VOLUME", defaults.default_volume)?,
            opus_bitrate: parse_or(var("OPUS_BITRATE"), "OPUS_BITRATE", defaults.opus_bitrate)?, // 96kbps (Discord default)
            max_queue_size: parse_or(var("MAX_QUEUE_SIZE"), "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_playlist_size: parse_or(
                var("MAX_PLAYLIST_SIZE"),
                "MAX_PLAYLIST_SIZE",
                defaults.max_playlist_size,
            )?,

            // Rendimiento
            worker_threads: parse_or(var("WORKER_THREADS"), "WORKER_THREADS", defaults.worker_threads)?,

            // Voz
            leave_on_queue_end: parse_or(
                var("LEAVE_ON_QUEUE_END"),
                "LEAVE_ON_QUEUE_END",
                defaults.leave_on_queue_end,
            )?,
            self_deafen: parse_or(var("SELF_DEAFEN"), "SELF_DEAFEN", defaults.self_deafen)?,

            // Fuentes
            ytdlp_path: tools.ytdlp_path,
            ffprobe_path: tools.ffprobe_path,
            resolver_timeout: tools.resolver_timeout,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Opus bitrate must be between 8kbps and 510kbps (Discord limit)
    /// - Queue, playlist and worker limits must be greater than 0
    /// - Resolver timeout must be at least one second
    pub fn validate(&self) -> Result<()> {
        // Validate audio settings
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.opus_bitrate > 510_000 {
            anyhow::bail!("Opus bitrate cannot exceed 510kbps, got: {}", self.opus_bitrate);
        }

        if self.opus_bitrate < 8_000 {
            anyhow::bail!("Opus bitrate too low, minimum 8kbps, got: {}", self.opus_bitrate);
        }

        // Validate limits
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        if self.resolver_timeout < Duration::from_secs(1) {
            anyhow::bail!(
                "Resolver timeout must be at least 1s, got: {}",
                humantime::format_duration(self.resolver_timeout)
            );
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the bot token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {}kbps\n  \
            Limits: {} queue, {} playlist, {} workers\n  \
            Voice: leave_on_end={}, self_deafen={}\n  \
            Resolvers: yt-dlp={}, ffprobe={}, timeout={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0).round() as u32,
            self.opus_bitrate / 1000,
            self.max_queue_size,
            self.max_playlist_size,
            self.worker_threads,
            self.leave_on_queue_end,
            self.self_deafen,
            self.ytdlp_path,
            self.ffprobe_path,
            humantime::format_duration(self.resolver_timeout),
        )
    }
}

/// Rutas de yt-dlp/ffprobe y su timeout.
///
/// Se cargan por separado para que `--health-check` funcione sin las
/// credenciales de Discord.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTools {
    pub ytdlp_path: String,
    pub ffprobe_path: String,
    pub resolver_timeout: Duration,
}

impl ExternalTools {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ffprobe_path: var("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            resolver_timeout: match var("RESOLVER_TIMEOUT") {
                Some(raw) => humantime::parse_duration(raw.trim())
                    .with_context(|| format!("RESOLVER_TIMEOUT inválido: {}", raw))?,
                None => defaults.resolver_timeout,
            },
        })
    }
}

impl Default for ExternalTools {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            resolver_timeout: Duration::from_secs(30),
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} inválido: {}", key, value)),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let tools = ExternalTools::default();

        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: 0.5,
            opus_bitrate: 96000, // 96kbps (Discord default)
            max_queue_size: 1000,
            max_playlist_size: 100,

            worker_threads: num_cpus::get(),

            leave_on_queue_end: true,
            self_deafen: true,

            ytdlp_path: tools.ytdlp_path,
            ffprobe_path: tools.ffprobe_path,
            resolver_timeout: tools.resolver_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("DISCORD_TOKEN", "token"), ("APPLICATION_ID", "42")];

    #[test]
    fn test_defaults_when_only_required_vars() {
        let config = load(&REQUIRED).unwrap();

        assert_eq!(config.application_id, 42);
        assert_eq!(config.guild_id, None);
        assert_eq!(config.default_volume, 0.5);
        assert_eq!(config.opus_bitrate, 96000);
        assert_eq!(config.max_queue_size, 1000);
        assert!(config.leave_on_queue_end);
        assert!(config.self_deafen);
        assert_eq!(config.resolver_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("GUILD_ID", "123"),
            ("OPUS_BITRATE", "128000"),
            ("LEAVE_ON_QUEUE_END", "false"),
            ("RESOLVER_TIMEOUT", "1m 30s"),
            ("YTDLP_PATH", "/usr/local/bin/yt-dlp"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.guild_id, Some(123));
        assert_eq!(config.opus_bitrate, 128000);
        assert!(!config.leave_on_queue_end);
        assert_eq!(config.resolver_timeout, Duration::from_secs(90));
        assert_eq!(config.ytdlp_path, "/usr/local/bin/yt-dlp");
    }

    #[test]
    fn test_missing_token_fails() {
        assert!(load(&[("APPLICATION_ID", "42")]).is_err());
    }

    #[test]
    fn test_out_of_range_values_fail() {
        for (key, value) in [
            ("DEFAULT_VOLUME", "3.0"),
            ("OPUS_BITRATE", "600000"),
            ("OPUS_BITRATE", "1000"),
            ("MAX_QUEUE_SIZE", "0"),
            ("RESOLVER_TIMEOUT", "10ms"),
            ("SELF_DEAFEN", "maybe"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, value));
            assert!(load(&vars).is_err(), "{}={} debería fallar", key, value);
        }
    }

    #[test]
    fn test_external_tools_load_without_discord_credentials() {
        let map: HashMap<&str, &str> = [("FFPROBE_PATH", "/opt/ffmpeg/bin/ffprobe")].into();
        let tools = ExternalTools::from_lookup(|key| map.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(tools.ytdlp_path, "yt-dlp");
        assert_eq!(tools.ffprobe_path, "/opt/ffmpeg/bin/ffprobe");
        assert_eq!(tools.resolver_timeout, Duration::from_secs(30));
        assert!(load(&[("FFPROBE_PATH", "/opt/ffmpeg/bin/ffprobe")]).is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("96kbps"));
    }
}
