//! # Error Types
//!
//! Guild-scoped error taxonomy for the voice engine.
//!
//! Every variant describes *what* went wrong for one guild; none of them is
//! process-fatal. Turning these into user-facing text is the job of the
//! command layer (see [`crate::bot::handlers`]).

use thiserror::Error;

/// Errores del ciclo de vida de la conexión de voz
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("ya conectado a ese canal de voz")]
    AlreadyInChannel,

    #[error("reproducción activa en otro canal")]
    Busy,

    #[error("no se pudo unir al canal de voz: {0}")]
    JoinFailed(String),

    #[error("no se pudo salir del canal de voz: {0}")]
    LeaveFailed(String),

    #[error("no hay conexión de voz activa")]
    NotConnected,
}

/// Errores de la máquina de estados de reproducción
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("no hay conexión de voz activa")]
    NotConnected,

    #[error("el bot está silenciado")]
    Muted,

    #[error("ya se está reproduciendo")]
    AlreadyStreaming,

    #[error("no se está reproduciendo nada")]
    NotStreaming,

    #[error("fuente de audio inválida: {0}")]
    InvalidSource(String),

    #[error("la reproducción ya está pausada")]
    AlreadyPaused,

    #[error("la reproducción no está pausada")]
    AlreadyPlaying,

    #[error("la cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("índice fuera de rango: {0}")]
    InvalidIndex(usize),
}

/// Errores al convertir una referencia en metadata reproducible
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("ninguna fuente reconoce: {0}")]
    NoResolverMatched(String),

    #[error("{resolver} no pudo obtener la metadata: {reason}")]
    FetchFailed { resolver: &'static str, reason: String },
}

/// Error agregado que devuelven las operaciones del controlador
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}
