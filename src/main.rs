use anyhow::{Context as _, Result};
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

use open_music_voice::{
    audio::{
        player::{PlaybackController, PlayerOptions},
        songbird_driver::{SongbirdEncoder, SongbirdTransport},
    },
    bot::{events::DiscordStatusSink, OpenMusicBot},
    config::{Config, ExternalTools},
    sources::{ResolverRegistry, YtDlp},
};

fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music_voice=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // El health check solo necesita las herramientas externas
    if std::env::args().any(|arg| arg == "--health-check") {
        let tools = ExternalTools::load()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Error al crear el runtime de tokio")?;
        return runtime.block_on(health_check(&tools));
    }

    info!("🎵 Iniciando Open Music Voice v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .context("Error al crear el runtime de tokio")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));

    let player = PlaybackController::new(
        Arc::new(SongbirdTransport::new(songbird.clone(), config.opus_bitrate)),
        Arc::new(SongbirdEncoder::default()),
        Arc::new(DiscordStatusSink::new(http)),
        PlayerOptions::from_config(&config),
    );
    let resolvers = Arc::new(ResolverRegistry::with_defaults(&config)?);

    // Crear handler del bot
    let handler = OpenMusicBot::new(config.clone(), player.clone(), resolvers);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        player.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(tools: &ExternalTools) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = YtDlp::new(tools.ytdlp_path.clone(), tools.resolver_timeout)
        .version()
        .await;

    let ffprobe = async_process::Command::new(&tools.ffprobe_path)
        .arg("-version")
        .output()
        .await;

    match (yt_dlp, ffprobe) {
        (Ok(version), Ok(output)) if output.status.success() => {
            info!("✅ yt-dlp {} y ffprobe disponibles", version);
            println!("OK");
            Ok(())
        }
        (yt_dlp, ffprobe) => {
            if let Err(e) = yt_dlp {
                warn!("❌ yt-dlp no disponible: {:#}", e);
            }
            if !matches!(ffprobe, Ok(ref output) if output.status.success()) {
                warn!("❌ ffprobe no disponible");
            }
            anyhow::bail!("Dependencias faltantes");
        }
    }
}
