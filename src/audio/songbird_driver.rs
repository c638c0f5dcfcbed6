//! # Songbird Driver
//!
//! Production implementations of the voice seams in [`crate::audio::driver`].
//!
//! - [`SongbirdTransport`] joins voice channels through the shared
//!   [`Songbird`] manager and applies mute/deafen and the Opus bitrate.
//! - [`SongbirdEncoder`] turns a stream URL into a lazy
//!   [`HttpRequest`] input; Songbird decodes and encodes it on its own
//!   mixer thread once the input is played on the call.
//!
//! Track end and track errors reported by Songbird are forwarded to the
//! attempt's [`CompletionSignal`]. Because the signal keeps only its first
//! write, the `End` event that Songbird also raises after a manual stop is
//! ignored once `stop`/`skip` has already written its outcome.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    driver::Bitrate,
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::audio::driver::{
    CompletionSignal, EncodeBackend, EncodeHandle, EncodeOptions, StreamHandle, StreamOutcome,
    VoiceConnection, VoiceTransport,
};

/// Transporte de voz sobre el manager de Songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    bitrate: u32,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, bitrate: u32) -> Self {
        Self { manager, bitrate }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    type Connection = SongbirdConnection;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        muted: bool,
        deafened: bool,
    ) -> Result<Self::Connection> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| anyhow!("Error al unirse al canal de voz: {}", e))?;

        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.mute(muted).await {
                warn!("⚠️ No se pudo aplicar silencio: {}", e);
            }
            if let Err(e) = handler.deafen(deafened).await {
                warn!("⚠️ No se pudo aplicar ensordecido: {}", e);
            }
            handler.set_bitrate(Bitrate::BitsPerSecond(self.bitrate as i32));
        }

        debug!("🔗 Call de Songbird listo para guild {}", guild_id);

        Ok(SongbirdConnection {
            manager: self.manager.clone(),
            guild_id,
            call,
        })
    }
}

/// Call de Songbird abierto en una guild
pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn change_channel(&self, channel_id: ChannelId, muted: bool, deafened: bool) -> Result<()> {
        let join = {
            let mut handler = self.call.lock().await;
            handler
                .mute(muted)
                .await
                .map_err(|e| anyhow!("Error al cambiar silencio: {}", e))?;
            handler
                .deafen(deafened)
                .await
                .map_err(|e| anyhow!("Error al cambiar ensordecido: {}", e))?;

            if handler.current_channel() == Some(channel_id.into()) {
                None
            } else {
                Some(
                    handler
                        .join(channel_id)
                        .await
                        .map_err(|e| anyhow!("Error al cambiar de canal: {}", e))?,
                )
            }
        };

        // La confirmación del gateway se espera sin retener el call
        if let Some(join) = join {
            join.await
                .map_err(|e| anyhow!("Error al cambiar de canal: {}", e))?;
        }

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| anyhow!("Error al salir del canal de voz: {}", e))
    }

    async fn set_speaking(&self, speaking: bool) {
        // Songbird gestiona el indicador de voz según el audio enviado
        debug!("🎙️ speaking={} en guild {}", speaking, self.guild_id);
    }
}

/// Backend que reproduce URLs HTTP con el mezclador de Songbird
#[derive(Clone)]
pub struct SongbirdEncoder {
    http: reqwest::Client,
}

impl SongbirdEncoder {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Default for SongbirdEncoder {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

/// Input preparado y, una vez iniciado, el track que lo reproduce
pub struct SongbirdEncode {
    input: SyncMutex<Option<Input>>,
    track: SyncMutex<Option<TrackHandle>>,
    volume: f32,
}

impl EncodeHandle for SongbirdEncode {
    fn stop(&self) {
        if let Some(track) = self.track.lock().as_ref() {
            if let Err(e) = track.stop() {
                debug!("Track ya detenido: {}", e);
            }
        }
    }

    fn cleanup(&self) {
        self.input.lock().take();
        self.track.lock().take();
    }
}

pub struct SongbirdStream {
    track: TrackHandle,
    paused: AtomicBool,
}

#[async_trait]
impl StreamHandle for SongbirdStream {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn set_paused(&self, paused: bool) {
        let result = if paused {
            self.track.pause()
        } else {
            self.track.play()
        };

        match result {
            Ok(()) => self.paused.store(paused, Ordering::Release),
            Err(e) => warn!("⚠️ No se pudo cambiar pausa: {}", e),
        }
    }

    async fn playback_position(&self) -> Duration {
        match self.track.get_info().await {
            Ok(state) => state.position,
            Err(_) => Duration::ZERO,
        }
    }
}

#[async_trait]
impl EncodeBackend for SongbirdEncoder {
    type Connection = SongbirdConnection;
    type Encoder = SongbirdEncode;
    type Stream = SongbirdStream;

    async fn encode(&self, stream_url: &str, options: &EncodeOptions) -> Result<Self::Encoder> {
        debug!("🎵 Preparando stream: {}", stream_url);

        let input: Input = HttpRequest::new(self.http.clone(), stream_url.to_string()).into();

        Ok(SongbirdEncode {
            input: SyncMutex::new(Some(input)),
            track: SyncMutex::new(None),
            volume: options.volume,
        })
    }

    async fn stream(
        &self,
        encoder: &Self::Encoder,
        connection: &Self::Connection,
        signal: CompletionSignal,
    ) -> Result<Self::Stream> {
        let input = encoder
            .input
            .lock()
            .take()
            .ok_or_else(|| anyhow!("El stream ya fue consumido"))?;

        let track = {
            let mut handler = connection.call.lock().await;
            handler.play_input(input)
        };

        if let Err(e) = track.set_volume(encoder.volume) {
            warn!("⚠️ No se pudo aplicar volumen: {}", e);
        }

        track
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndHandler {
                    signal: signal.clone(),
                },
            )
            .map_err(|e| anyhow!("Error al agregar event handler: {}", e))?;
        track
            .add_event(Event::Track(TrackEvent::Error), TrackErrorHandler { signal })
            .map_err(|e| anyhow!("Error al agregar event handler: {}", e))?;

        *encoder.track.lock() = Some(track.clone());
        info!("▶️ Stream iniciado en guild {}", connection.guild_id);

        Ok(SongbirdStream {
            track,
            paused: AtomicBool::new(false),
        })
    }
}

/// Fin natural del track
struct TrackEndHandler {
    signal: CompletionSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if self.signal.complete(StreamOutcome::Completed) {
            debug!("Track terminado");
        }
        None
    }
}

/// Error de E/S o decodificación reportado por Songbird
struct TrackErrorHandler {
    signal: CompletionSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let reason = match ctx {
            EventContext::Track(track_list) => track_list
                .iter()
                .find_map(|(state, _handle)| match &state.playing {
                    PlayMode::Errored(e) => Some(format!("{:?}", e)),
                    _ => None,
                })
                .unwrap_or_else(|| "error de reproducción".to_string()),
            _ => "error de reproducción".to_string(),
        };

        if self.signal.complete(StreamOutcome::Faulted(reason.clone())) {
            error!("❌ Error en track: {}", reason);
        }
        None
    }
}
