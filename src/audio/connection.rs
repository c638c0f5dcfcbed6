use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        driver::{EncodeBackend, VoiceConnection, VoiceTransport},
        session::{GuildSession, VoiceLink},
    },
    error::ConnectionError,
};

/// Resultado de una conexión exitosa
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Joined,
    /// Estaba en otro canal sin reproducir y se movió
    Moved,
    AlreadyConnected,
}

/// Abre, mueve y cierra la conexión de voz de una sesión.
///
/// Todas las operaciones reciben la sesión ya bloqueada por el llamador.
pub struct ConnectionManager<T: VoiceTransport> {
    transport: Arc<T>,
}

impl<T: VoiceTransport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub async fn connect<E>(
        &self,
        guild_id: GuildId,
        session: &mut GuildSession<E>,
        channel_id: ChannelId,
    ) -> Result<ConnectOutcome, ConnectionError>
    where
        E: EncodeBackend<Connection = T::Connection>,
    {
        let outcome = match session.channel_id() {
            None => ConnectOutcome::Joined,
            Some(current) if current == channel_id => return Ok(ConnectOutcome::AlreadyConnected),
            Some(_) if session.is_streaming() => return Err(ConnectionError::Busy),
            Some(current) => {
                info!("🔀 Moviendo de canal {} a {} en guild {}", current, channel_id, guild_id);
                if let Err(e) = self.disconnect(guild_id, session).await {
                    warn!("⚠️ No se pudo cerrar la conexión anterior: {}", e);
                }
                ConnectOutcome::Moved
            }
        };

        let connection = self
            .transport
            .connect(guild_id, channel_id, session.muted, session.deafened)
            .await
            .map_err(|e| ConnectionError::JoinFailed(e.to_string()))?;

        session.voice = Some(VoiceLink {
            channel_id,
            connection,
        });

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(outcome)
    }

    /// Cierra la conexión. El llamador debe detener antes cualquier stream.
    pub async fn disconnect<E>(
        &self,
        guild_id: GuildId,
        session: &mut GuildSession<E>,
    ) -> Result<(), ConnectionError>
    where
        E: EncodeBackend<Connection = T::Connection>,
    {
        let link = session.voice.take().ok_or(ConnectionError::NotConnected)?;

        link.connection
            .disconnect()
            .await
            .map_err(|e| ConnectionError::LeaveFailed(e.to_string()))?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    /// Reaplica silencio/ensordecido sobre la conexión viva
    pub async fn apply_flags<E>(&self, session: &GuildSession<E>) -> Result<(), ConnectionError>
    where
        E: EncodeBackend<Connection = T::Connection>,
    {
        let link = session.voice.as_ref().ok_or(ConnectionError::NotConnected)?;

        link.connection
            .change_channel(link.channel_id, session.muted, session.deafened)
            .await
            .map_err(|e| ConnectionError::JoinFailed(e.to_string()))
    }
}
