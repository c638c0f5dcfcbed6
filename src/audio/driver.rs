//! # Voice Driver Seams
//!
//! Traits for the collaborators the playback engine drives but does not
//! implement: the voice transport (gateway + UDP), the encode/stream backend
//! and the status announcer. [`crate::audio::songbird_driver`] provides the
//! production implementations on top of Songbird; tests plug in fakes.
//!
//! A playback attempt is ended through a [`CompletionSignal`]. A fresh signal
//! is created for every attempt and only its first write is delivered, so the
//! backend (end of stream, I/O fault) and the controller (`stop`/`skip`) can
//! race on it safely.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;

use crate::audio::queue::QueueEntry;

/// Motivo por el que terminó un intento de reproducción
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Fin natural del stream
    Completed,
    StoppedByUser,
    SkippedByUser,
    /// Error real de E/S o de decodificación
    Faulted(String),
}

impl StreamOutcome {
    /// `true` para las terminaciones intencionales (stop/skip)
    pub fn is_user_control(&self) -> bool {
        matches!(self, StreamOutcome::StoppedByUser | StreamOutcome::SkippedByUser)
    }
}

pub type CompletionReceiver = oneshot::Receiver<StreamOutcome>;

/// Señal de un solo uso que cierra un intento de reproducción
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Arc<Mutex<Option<oneshot::Sender<StreamOutcome>>>>,
}

impl CompletionSignal {
    pub fn new() -> (Self, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        let signal = Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        (signal, rx)
    }

    /// Escribe el resultado. Devuelve `false` si la señal ya había sido escrita.
    pub fn complete(&self, outcome: StreamOutcome) -> bool {
        match self.tx.lock().take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

/// Opciones de codificación aplicadas a cada stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeOptions {
    /// Volumen lineal (1.0 = original)
    pub volume: f32,
    /// Bitrate Opus en bits por segundo
    pub bitrate: u32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            volume: 0.5,
            bitrate: 96_000,
        }
    }
}

/// Abre conexiones de voz
#[async_trait]
pub trait VoiceTransport: Send + Sync + 'static {
    type Connection: VoiceConnection;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        muted: bool,
        deafened: bool,
    ) -> Result<Self::Connection>;
}

/// Conexión de voz abierta en una guild
#[async_trait]
pub trait VoiceConnection: Send + Sync + 'static {
    async fn change_channel(&self, channel_id: ChannelId, muted: bool, deafened: bool) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Indicador de presencia; los fallos se ignoran
    async fn set_speaking(&self, speaking: bool);
}

/// Pipeline de codificación de un único stream
pub trait EncodeHandle: Send + Sync + 'static {
    /// Detiene la entrega de audio
    fn stop(&self);

    /// Libera los recursos externos (procesos, buffers)
    fn cleanup(&self);
}

/// Stream activo hacia la conexión de voz
#[async_trait]
pub trait StreamHandle: Send + Sync + 'static {
    fn is_paused(&self) -> bool;

    fn set_paused(&self, paused: bool);

    async fn playback_position(&self) -> Duration;
}

/// Convierte URLs de stream en audio enviado por una conexión
#[async_trait]
pub trait EncodeBackend: Send + Sync + 'static {
    type Connection: VoiceConnection;
    type Encoder: EncodeHandle;
    type Stream: StreamHandle;

    async fn encode(&self, stream_url: &str, options: &EncodeOptions) -> Result<Self::Encoder>;

    /// Empieza a enviar audio. El backend escribe `signal` al terminar el
    /// stream (`Completed`) o ante un error (`Faulted`).
    async fn stream(
        &self,
        encoder: &Self::Encoder,
        connection: &Self::Connection,
        signal: CompletionSignal,
    ) -> Result<Self::Stream>;
}

/// Eventos que se anuncian en el canal de estado de la guild
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    NowPlaying(QueueEntry),
    QueueFinished,
    Fault { title: String, reason: String },
}

#[async_trait]
pub trait StatusSink: Send + Sync + 'static {
    async fn announce(&self, guild_id: GuildId, channel_id: ChannelId, event: StatusEvent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_first_write_wins() {
        let (signal, rx) = CompletionSignal::new();
        let backend_side = signal.clone();

        assert!(signal.complete(StreamOutcome::SkippedByUser));
        assert!(!backend_side.complete(StreamOutcome::Completed));
        assert!(backend_side.is_completed());

        assert_eq!(rx.await.unwrap(), StreamOutcome::SkippedByUser);
    }

    #[test]
    fn test_control_outcomes_are_not_faults() {
        assert!(StreamOutcome::StoppedByUser.is_user_control());
        assert!(StreamOutcome::SkippedByUser.is_user_control());
        assert!(!StreamOutcome::Completed.is_user_control());
        assert!(!StreamOutcome::Faulted("eof".into()).is_user_control());
    }
}
