use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    player::NowPlaying,
    queue::{QueueEntry, QueueSnapshot, RepeatMode},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Open Music Bot";

const QUEUE_PAGE_SIZE: usize = 10;

/// Campos comunes de una entrada: artista, duración, solicitante y fuente
fn with_entry_fields(mut embed: CreateEmbed, entry: &QueueEntry) -> CreateEmbed {
    let artist = entry
        .metadata
        .artist_names()
        .unwrap_or_else(|| "Desconocido".to_string());

    embed = embed.field("🎤 Artista", artist, true);

    embed = match entry.duration() {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    embed = embed
        .field("👤 Solicitado por", format!("<@{}>", entry.requested_by), true)
        .field("🔗 Fuente", entry.source_name, true);

    if let Some(thumbnail) = &entry.metadata.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed.url(&entry.metadata.url)
}

/// Anuncio de la canción que empieza a sonar
pub fn create_now_playing_embed(entry: &QueueEntry) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", entry.title()))
        .color(Colour::new(entry.source_color));

    with_entry_fields(embed, entry)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Respuesta de `/nowplaying` con progreso
pub fn create_now_playing_status_embed(now: &NowPlaying) -> CreateEmbed {
    let progress = match now.entry.duration() {
        Some(total) => format!(
            "{} {} / {}",
            progress_bar(now.position, total),
            format_duration(now.position),
            format_duration(total)
        ),
        None => format!("🔴 {}", format_duration(now.position)),
    };

    let title = if now.paused {
        "⏸️ En Pausa"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**\n\n{}", now.entry.title(), progress))
        .color(Colour::new(now.entry.source_color));

    with_entry_fields(embed, &now.entry)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(entry: &QueueEntry, position: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** se ha agregado a la cola en la posición **#{}**",
            entry.title(),
            position
        ))
        .color(colors::SUCCESS_GREEN);

    with_entry_fields(embed, entry)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando le toque",
        ))
}

/// Crea un embed para mostrar que una playlist fue agregada
pub fn create_playlist_added_embed(track_count: usize, source_name: &str) -> CreateEmbed {
    let description = if track_count == 1 {
        "Se agregó **1 canción** a la cola de reproducción".to_string()
    } else {
        format!(
            "Se agregaron **{} canciones** a la cola de reproducción",
            track_count
        )
    };

    CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .field("📊 Canciones agregadas", track_count.to_string(), true)
        .field("🔗 Fuente", source_name, true)
        .footer(CreateEmbedFooter::new(
            "🎵 Usa /queue para ver todas las canciones",
        ))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.now_playing.is_none() && snapshot.total_items() == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <url>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &snapshot.now_playing {
        let status = match snapshot.repeat {
            RepeatMode::Track => "🔂",
            RepeatMode::Queue => "🔁",
            RepeatMode::Off => "▶️",
        };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            describe_entry(current),
            false,
        );
    }

    let queue_page = snapshot.page(page, QUEUE_PAGE_SIZE);
    if !queue_page.items.is_empty() {
        let mut description = String::new();
        for (offset, item) in queue_page.items.iter().enumerate() {
            description.push_str(&format!(
                "**{}**. {}\n",
                queue_page.first_position + offset,
                describe_entry(item)
            ));
        }
        embed = embed.field("📜 Siguientes", description, false);
    }

    let mut info = format!(
        "📊 **{}** canciones • ⏱️ **{}**",
        snapshot.total_items(),
        format_duration(snapshot.total_duration())
    );
    if snapshot.shuffle {
        info.push_str(" • 🔀 **Aleatorio**");
    }
    embed = embed.field("Información", info, false);

    let footer = if queue_page.total_pages > 1 {
        format!(
            "Página {}/{} • {}",
            queue_page.current_page, queue_page.total_pages, STANDARD_FOOTER
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

pub fn create_queue_finished_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("📭 Cola Terminada")
        .description("No quedan canciones en la cola.\n\n💡 Usa `/play <url>` para seguir escuchando")
        .color(colors::NEUTRAL_GRAY)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Error de reproducción de una canción concreta
pub fn create_fault_embed(title: &str, reason: &str) -> CreateEmbed {
    let track = if title.is_empty() {
        "la canción actual"
    } else {
        title
    };

    CreateEmbed::default()
        .title("⚠️ Error de Reproducción")
        .description(format!(
            "No se pudo reproducir **{}**\n\n**Motivo**: {}\n\n⏭️ Continuando con la siguiente",
            track, reason
        ))
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("Open Music Bot"))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("Open Music Bot"))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("Open Music Bot"))
}

fn describe_entry(entry: &QueueEntry) -> String {
    let artist = entry
        .metadata
        .artist_names()
        .map(|a| format!(" - {}", a))
        .unwrap_or_default();
    let duration = entry
        .duration()
        .map(|d| format!(" `[{}]`", format_duration(d)))
        .unwrap_or_default();

    format!(
        "[{}]({}){}{} • <@{}>",
        entry.title(),
        entry.metadata.url,
        artist,
        duration,
        entry.requested_by
    )
}

/// Barra de progreso de 20 segmentos
pub fn progress_bar(position: Duration, total: Duration) -> String {
    const WIDTH: usize = 20;

    let ratio = if total.is_zero() {
        0.0
    } else {
        (position.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
    };
    let filled = ((ratio * WIDTH as f64).round() as usize).min(WIDTH);

    format!("{}🔘{}", "▬".repeat(filled), "▬".repeat(WIDTH - filled))
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
