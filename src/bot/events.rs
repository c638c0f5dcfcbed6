use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::{
    audio::driver::{StatusEvent, StatusSink},
    ui::embeds,
};

/// Publica los anuncios de reproducción en el canal de texto de la guild
pub struct DiscordStatusSink {
    http: Arc<Http>,
}

impl DiscordStatusSink {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StatusSink for DiscordStatusSink {
    async fn announce(&self, guild_id: GuildId, channel_id: ChannelId, event: StatusEvent) {
        let embed = match &event {
            StatusEvent::NowPlaying(entry) => embeds::create_now_playing_embed(entry),
            StatusEvent::QueueFinished => embeds::create_queue_finished_embed(),
            StatusEvent::Fault { title, reason } => embeds::create_fault_embed(title, reason),
        };

        // Un anuncio fallido no afecta la reproducción
        match channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
        {
            Ok(_) => debug!("📣 Anuncio enviado en guild {}", guild_id),
            Err(e) => error!("Error al enviar anuncio en guild {}: {:?}", guild_id, e),
        }
    }
}
