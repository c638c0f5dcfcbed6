use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandDataOption, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{
        player::PlayOutcome,
        queue::{QueueEntry, RepeatMode},
        session::PlaybackState,
    },
    bot::OpenMusicBot,
    error::{ConnectionError, PlaybackError, ResolutionError, VoiceError},
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OpenMusicBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        let embed = embeds::create_error_embed(
            "Solo en servidores",
            "Este comando solo funciona dentro de un servidor",
        );
        return respond(ctx, &command, embed).await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => return handle_play(ctx, &command, bot, guild_id).await,
        "copyqueue" => return handle_copy_queue(ctx, &command, bot, guild_id).await,
        _ => {}
    }

    let embed = match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(bot, guild_id).await,
        "stop" => handle_stop(bot, guild_id).await,
        "skip" => handle_skip(bot, guild_id).await,
        "pause" => handle_pause(bot, guild_id).await,
        "resume" => handle_resume(bot, guild_id).await,
        "loop" => handle_loop(&command, bot, guild_id).await,
        "shuffle" => handle_shuffle(bot, guild_id).await,
        "queue" => handle_queue(&command, bot, guild_id).await,
        "remove" => handle_remove(&command, bot, guild_id).await,
        "clear" => handle_clear(bot, guild_id).await,
        "nowplaying" => handle_nowplaying(bot, guild_id).await,
        "mute" => handle_mute(&command, bot, guild_id).await,
        "deafen" => handle_deafen(&command, bot, guild_id).await,
        _ => embeds::create_error_embed("Comando no reconocido", "Ese comando no existe"),
    };

    respond(ctx, &command, embed).await
}

// Conexión

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> CreateEmbed {
    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(embed) => return embed,
    };

    bot.player
        .set_status_channel(guild_id, command.channel_id)
        .await;

    match bot.player.join(guild_id, channel_id).await {
        Ok(_) => embeds::create_success_embed(
            "Conectado",
            &format!("🔊 Conectado a <#{}>", channel_id),
        ),
        Err(e) => error_embed(&e.into()),
    }
}

async fn handle_leave(bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    match bot.player.leave(guild_id).await {
        Ok(()) => embeds::create_success_embed("Desconectado", "👋 Salí del canal de voz"),
        Err(e) => error_embed(&e.into()),
    }
}

async fn handle_mute(command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    let enabled = bool_option(command, "enabled").unwrap_or(true);

    match bot.player.set_muted(guild_id, enabled).await {
        Ok(()) if enabled => embeds::create_info_embed("Silenciado", "🔇 El bot está silenciado"),
        Ok(()) => embeds::create_info_embed("Micrófono activo", "🔊 El bot ya puede reproducir"),
        Err(e) => error_embed(&e.into()),
    }
}

async fn handle_deafen(
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> CreateEmbed {
    let enabled = bool_option(command, "enabled").unwrap_or(true);

    match bot.player.set_deafened(guild_id, enabled).await {
        Ok(()) if enabled => embeds::create_info_embed("Ensordecido", "🙉 El bot está ensordecido"),
        Ok(()) => embeds::create_info_embed("Audio entrante activo", "👂 El bot ya no está ensordecido"),
        Err(e) => error_embed(&e.into()),
    }
}

// Reproducción

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(url) = str_option(command, "url") else {
        let embed = embeds::create_error_embed("Falta la URL", "Usa `/play <url>`");
        return respond(ctx, command, embed).await;
    };

    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(embed) => return respond(ctx, command, embed).await,
    };

    // Defer la respuesta ya que la resolución puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    bot.player
        .set_status_channel(guild_id, command.channel_id)
        .await;

    let embed = match bot.resolvers.create_queue_entries(url, command.user.id).await {
        Ok(entries) => play_entries(bot, guild_id, channel_id, entries).await,
        Err(e) => error_embed(&e.into()),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

/// Reproduce la primera entrada y encola el resto
async fn play_entries(
    bot: &OpenMusicBot,
    guild_id: GuildId,
    channel_id: ChannelId,
    entries: Vec<QueueEntry>,
) -> CreateEmbed {
    let total = entries.len();
    let Some(source_name) = entries.first().map(|entry| entry.source_name) else {
        return embeds::create_error_embed("Sin resultados", "No se encontró nada que reproducir");
    };

    let batch = match bot.player.play_batch(guild_id, channel_id, entries).await {
        Ok(batch) => batch,
        Err(e) if total > 1 => {
            warn!("⚠️ Playlist descartada en guild {}: {}", guild_id, e);
            let (title, description) = describe_error(&e);
            return embeds::create_error_embed(
                title,
                &format!(
                    "{}\n\nNo se agregó ninguna de las {} canciones de la playlist",
                    description, total
                ),
            );
        }
        Err(e) => return error_embed(&e),
    };

    if total > 1 {
        let embed = embeds::create_playlist_added_embed(batch.enqueued + 1, source_name);
        return if batch.skipped > 0 {
            embed.field("⚠️ Omitidas", batch.skipped.to_string(), true)
        } else {
            embed
        };
    }

    match batch.outcome {
        PlayOutcome::Started => embeds::create_now_playing_embed(&batch.first),
        PlayOutcome::Queued { position } => embeds::create_track_added_embed(&batch.first, position),
        PlayOutcome::Cancelled => embeds::create_info_embed(
            "Reproducción cancelada",
            "⏹️ La reproducción se detuvo antes de empezar",
        ),
    }
}

async fn handle_stop(bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    match bot.player.stop(guild_id).await {
        Ok(()) => embeds::create_success_embed("Detenido", "⏹️ Reproducción detenida"),
        Err(e) => error_embed(&e.into()),
    }
}

async fn handle_skip(bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    match bot.player.skip(guild_id).await {
        Ok(()) => embeds::create_success_embed("Saltada", "⏭️ Pasando a la siguiente canción"),
        Err(e) => error_embed(&e.into()),
    }
}

async fn handle_pause(bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    match bot.player.pause(guild_id).await {
        Ok(()) => embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada"),
        Err(e) => error_embed(&e.into()),
    }
}

async fn handle_resume(bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    match bot.player.resume(guild_id).await {
        Ok(()) => embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada"),
        Err(e) => error_embed(&e.into()),
    }
}

async fn handle_nowplaying(bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    match bot.player.now_playing(guild_id).await {
        Some(now) => embeds::create_now_playing_status_embed(&now),
        None => embeds::create_info_embed("Nada sonando", "😴 No hay nada reproduciéndose"),
    }
}

// Cola

async fn handle_loop(command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    let mode = match str_option(command, "mode").map(str::parse::<RepeatMode>) {
        Some(Ok(mode)) => mode,
        _ => {
            return embeds::create_error_embed(
                "Modo inválido",
                "Los modos válidos son `off`, `track` y `queue`",
            )
        }
    };

    bot.player.set_repeat(guild_id, mode).await;

    let description = match mode {
        RepeatMode::Off => "➡️ Repetición desactivada",
        RepeatMode::Track => "🔂 Repitiendo la canción actual",
        RepeatMode::Queue => "🔁 Repitiendo toda la cola",
    };
    embeds::create_success_embed("Modo de repetición", description)
}

async fn handle_shuffle(bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    if bot.player.toggle_shuffle(guild_id).await {
        embeds::create_success_embed("Aleatorio", "🔀 Modo aleatorio activado")
    } else {
        embeds::create_success_embed("Aleatorio", "➡️ Modo aleatorio desactivado")
    }
}

async fn handle_queue(command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    let page = int_option(command, "page").unwrap_or(1).max(1) as usize;
    let snapshot = bot.player.queue(guild_id).await;
    embeds::create_queue_embed(&snapshot, page)
}

async fn handle_remove(command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    let Some(position) = int_option(command, "position").filter(|p| *p >= 1) else {
        return embeds::create_error_embed("Posición inválida", "Usa una posición de `/queue`");
    };

    // Las posiciones que ve el usuario empiezan en 1
    match bot.player.remove(guild_id, position as usize - 1).await {
        Ok(entry) => embeds::create_success_embed(
            "Eliminada",
            &format!("❌ **{}** fue eliminada de la cola", entry.title()),
        ),
        Err(PlaybackError::InvalidIndex(_)) => embeds::create_error_embed(
            "Posición inválida",
            &format!("No hay ninguna canción en la posición #{}", position),
        ),
        Err(e) => error_embed(&e.into()),
    }
}

async fn handle_clear(bot: &OpenMusicBot, guild_id: GuildId) -> CreateEmbed {
    let removed = bot.player.clear_queue(guild_id).await;
    embeds::create_success_embed(
        "Cola limpiada",
        &format!("🗑️ Se eliminaron {} canciones", removed),
    )
}

async fn handle_copy_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let source = str_option(command, "guild")
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|id| *id != 0)
        .map(GuildId::new);

    let embed = match source {
        None => embeds::create_error_embed("ID inválido", "Indica el ID numérico del servidor"),
        Some(source) if !ctx.cache.guilds().contains(&source) => embeds::create_error_embed(
            "Servidor desconocido",
            "El bot no está en ese servidor",
        ),
        Some(source) => copy_queue(ctx, command, bot, source, guild_id).await,
    };

    respond(ctx, command, embed).await
}

async fn copy_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    from: GuildId,
    to: GuildId,
) -> CreateEmbed {
    let copied = match bot.player.copy_queue(from, to).await {
        Ok(0) => {
            return embeds::create_info_embed("Nada que copiar", "📭 La cola de origen está vacía")
        }
        Ok(copied) => copied,
        Err(e) => return error_embed(&e.into()),
    };

    // Si aquí no suena nada y el usuario está en voz, arrancar la cola copiada
    if bot.player.state(to).await == PlaybackState::Idle {
        if let Ok(channel_id) = get_user_voice_channel(ctx, to, command.user.id) {
            bot.player.set_status_channel(to, command.channel_id).await;
            if let Err(e) = bot.player.play_next_queued(to, channel_id).await {
                warn!("⚠️ No se pudo iniciar la cola copiada en guild {}: {}", to, e);
            }
        }
    }

    embeds::create_success_embed(
        "Cola copiada",
        &format!("📋 Se copiaron {} canciones", copied),
    )
}

// Utilidades

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

fn option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a CommandDataOption> {
    command.data.options.iter().find(|opt| opt.name == name)
}

fn str_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    option(command, name).and_then(|opt| opt.value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    option(command, name).and_then(|opt| opt.value.as_i64())
}

fn bool_option(command: &CommandInteraction, name: &str) -> Option<bool> {
    option(command, name).and_then(|opt| opt.value.as_bool())
}

/// Canal de voz actual del usuario, según la caché
fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId, CreateEmbed> {
    let guild = guild_id.to_guild_cached(&ctx.cache).ok_or_else(|| {
        embeds::create_error_embed("Servidor no disponible", "Intenta de nuevo en unos segundos")
    })?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| {
            embeds::create_error_embed("Sin canal de voz", "Debes estar en un canal de voz")
        })
}

fn error_embed(error: &VoiceError) -> CreateEmbed {
    let (title, description) = describe_error(error);
    embeds::create_error_embed(title, &description)
}

/// Texto para el usuario de cada error del motor de voz
pub fn describe_error(error: &VoiceError) -> (&'static str, String) {
    match error {
        VoiceError::Connection(e) => match e {
            ConnectionError::AlreadyInChannel => {
                ("Ya conectado", "Ya estoy en ese canal de voz".to_string())
            }
            ConnectionError::Busy => (
                "Ocupado",
                "Estoy reproduciendo en otro canal. Usa `/stop` primero".to_string(),
            ),
            ConnectionError::JoinFailed(reason) => (
                "No pude conectarme",
                format!("Verifica mis permisos de `Conectar` y `Hablar`\n`{}`", reason),
            ),
            ConnectionError::LeaveFailed(reason) => {
                ("No pude desconectarme", format!("`{}`", reason))
            }
            ConnectionError::NotConnected => (
                "Sin conexión",
                "No estoy en ningún canal de voz".to_string(),
            ),
        },
        VoiceError::Playback(e) => match e {
            PlaybackError::NotConnected => (
                "Sin conexión",
                "No estoy en ningún canal de voz".to_string(),
            ),
            PlaybackError::Muted => (
                "Silenciado",
                "Estoy silenciado. Usa `/mute enabled:false` para reproducir".to_string(),
            ),
            PlaybackError::AlreadyStreaming => (
                "Ya reproduciendo",
                "Ya hay música sonando".to_string(),
            ),
            PlaybackError::NotStreaming => (
                "Nada sonando",
                "No hay nada reproduciéndose".to_string(),
            ),
            PlaybackError::InvalidSource(reason) => (
                "Fuente inválida",
                format!("No se pudo abrir el audio\n`{}`", reason),
            ),
            PlaybackError::AlreadyPaused => ("Ya en pausa", "La música ya está pausada".to_string()),
            PlaybackError::AlreadyPlaying => (
                "No está en pausa",
                "La música ya está sonando".to_string(),
            ),
            PlaybackError::QueueFull { max } => (
                "Cola llena",
                format!("La cola admite como máximo {} canciones", max),
            ),
            PlaybackError::InvalidIndex(index) => (
                "Posición inválida",
                format!("No hay ninguna canción en la posición #{}", index + 1),
            ),
        },
        VoiceError::Resolution(e) => match e {
            ResolutionError::NoResolverMatched(reference) => (
                "URL no soportada",
                format!(
                    "No reconozco `{}`\n\n💡 Usa una URL de YouTube, SoundCloud, Bandcamp o un archivo de audio",
                    reference
                ),
            ),
            ResolutionError::FetchFailed { resolver, reason } => (
                "No se pudo cargar",
                format!("{} respondió con un error\n`{}`", resolver, reason),
            ),
        },
    }
}
