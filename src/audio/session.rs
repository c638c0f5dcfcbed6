use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::audio::{
    driver::{CompletionSignal, EncodeBackend, EncodeHandle},
    queue::{QueueEntry, QueueStore, QueueSnapshot, RepeatMode},
};

/// Estado observable de la reproducción en una guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    /// Arrancando un stream: conexión y codificador, sin pipeline todavía.
    /// También cubre el paso de una canción a la siguiente.
    Connecting,
    Playing,
    Paused,
    Stopping,
}

/// Conexión de voz junto al canal al que apunta
pub struct VoiceLink<C> {
    pub channel_id: ChannelId,
    pub connection: C,
}

/// Pipeline activo: codificador, stream y la señal del intento actual
pub struct Pipeline<E: EncodeBackend> {
    pub encoder: E::Encoder,
    pub stream: E::Stream,
    pub signal: CompletionSignal,
}

/// Estado de voz de una guild. Solo se accede a través de su `Mutex`.
pub struct GuildSession<E: EncodeBackend> {
    pub voice: Option<VoiceLink<E::Connection>>,
    pub pipeline: Option<Pipeline<E>>,
    pub queue: QueueStore,
    pub now_playing: Option<QueueEntry>,
    pub repeat: RepeatMode,
    pub muted: bool,
    pub deafened: bool,
    pub status_channel: Option<ChannelId>,
    pub state: PlaybackState,
    /// Identifica el intento de reproducción vigente; las tareas de fondo
    /// con otra generación ya no pueden modificar la sesión.
    pub generation: u64,
}

impl<E: EncodeBackend> GuildSession<E> {
    pub fn new(max_queue_size: usize, deafened: bool) -> Self {
        Self {
            voice: None,
            pipeline: None,
            queue: QueueStore::new(max_queue_size),
            now_playing: None,
            repeat: RepeatMode::Off,
            muted: false,
            deafened,
            status_channel: None,
            state: PlaybackState::Idle,
            generation: 0,
        }
    }

    /// Hay un intento de reproducción en curso (incluye conexión y transiciones)
    pub fn is_streaming(&self) -> bool {
        self.state != PlaybackState::Idle
    }

    pub fn is_connected(&self) -> bool {
        self.voice.is_some()
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.voice.as_ref().map(|link| link.channel_id)
    }

    /// Abre un intento nuevo e invalida cualquier tarea anterior
    pub fn begin_attempt(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Promueve una entrada a "reproduciendo" junto con su pipeline
    pub fn install(&mut self, entry: QueueEntry, pipeline: Pipeline<E>) {
        self.now_playing = Some(entry);
        self.pipeline = Some(pipeline);
        self.state = PlaybackState::Playing;
    }

    /// Desmonta el pipeline y devuelve la entrada que estaba sonando
    pub fn teardown(&mut self) -> Option<QueueEntry> {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.encoder.stop();
            pipeline.encoder.cleanup();
            debug!("🧹 Pipeline liberado");
        }
        self.now_playing.take()
    }

    /// Decide qué suena después de un fin natural según el modo de repetición
    pub fn select_next(&mut self, finished: Option<QueueEntry>) -> Option<QueueEntry> {
        match (self.repeat, finished) {
            (RepeatMode::Track, Some(entry)) => Some(entry),
            (RepeatMode::Queue, Some(entry)) => {
                self.queue.requeue(entry);
                self.queue.pop_next()
            }
            _ => self.queue.pop_next(),
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.now_playing.clone(),
            entries: self.queue.entries(),
            repeat: self.repeat,
            shuffle: self.queue.is_shuffled(),
        }
    }

    /// Pipeline ⇔ conexión ∧ entrada actual, y permutación válida
    pub fn is_coherent(&self) -> bool {
        let pipeline_ok =
            self.pipeline.is_some() == (self.voice.is_some() && self.now_playing.is_some());
        pipeline_ok && self.queue.is_consistent()
    }
}

pub type SharedSession<E> = Arc<Mutex<GuildSession<E>>>;

/// Registro explícito `GuildId -> sesión`, creada en el primer uso
pub struct SessionRegistry<E: EncodeBackend> {
    sessions: DashMap<GuildId, SharedSession<E>>,
    max_queue_size: usize,
    self_deafen: bool,
}

impl<E: EncodeBackend> SessionRegistry<E> {
    pub fn new(max_queue_size: usize, self_deafen: bool) -> Self {
        Self {
            sessions: DashMap::new(),
            max_queue_size,
            self_deafen,
        }
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> SharedSession<E> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🆕 Sesión de voz creada para guild {}", guild_id);
                Arc::new(Mutex::new(GuildSession::new(
                    self.max_queue_size,
                    self.self_deafen,
                )))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SharedSession<E>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
