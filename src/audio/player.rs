use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::MutexGuard;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        connection::{ConnectOutcome, ConnectionManager},
        driver::{
            CompletionReceiver, CompletionSignal, EncodeBackend, EncodeHandle, EncodeOptions,
            StatusEvent, StatusSink, StreamHandle, StreamOutcome, VoiceConnection, VoiceTransport,
        },
        queue::{QueueEntry, QueueSnapshot, RepeatMode},
        session::{GuildSession, PlaybackState, Pipeline, SessionRegistry, SharedSession},
    },
    config::Config,
    error::{ConnectionError, PlaybackError, VoiceError},
};

/// Ajustes del reproductor derivados de la configuración
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub encode: EncodeOptions,
    pub max_queue_size: usize,
    /// Salir del canal cuando la cola termina de forma natural
    pub leave_on_queue_end: bool,
    pub self_deafen: bool,
}

impl PlayerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            encode: EncodeOptions {
                volume: config.default_volume,
                bitrate: config.opus_bitrate,
            },
            max_queue_size: config.max_queue_size,
            leave_on_queue_end: config.leave_on_queue_end,
            self_deafen: config.self_deafen,
        }
    }
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            encode: EncodeOptions::default(),
            max_queue_size: 1000,
            leave_on_queue_end: true,
            self_deafen: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    /// Ya había algo sonando; la entrada quedó en la cola
    Queued { position: usize },
    /// Un `stop` llegó antes de que el stream arrancara
    Cancelled,
}

/// Resultado de reproducir una lista de entradas (playlist)
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Primera entrada que arrancó o quedó en la cola
    pub first: QueueEntry,
    pub outcome: PlayOutcome,
    /// Entradas encoladas detrás de la primera
    pub enqueued: usize,
    /// Entradas descartadas porque su fuente no arrancó
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub entry: QueueEntry,
    pub position: Duration,
    pub paused: bool,
}

/// Máquina de estados de reproducción por guild.
///
/// Cada operación bloquea la sesión de la guild solo mientras la modifica.
/// La resolución de metadata, el arranque del codificador y la espera del
/// stream ocurren fuera del lock; la espera corre en una tarea por guild.
pub struct PlaybackController<T, E>
where
    T: VoiceTransport,
    E: EncodeBackend<Connection = T::Connection>,
{
    sessions: Arc<SessionRegistry<E>>,
    connections: Arc<ConnectionManager<T>>,
    backend: Arc<E>,
    status: Arc<dyn StatusSink>,
    options: Arc<PlayerOptions>,
}

// Implementar Clone manualmente: T y E no necesitan ser Clone
impl<T, E> Clone for PlaybackController<T, E>
where
    T: VoiceTransport,
    E: EncodeBackend<Connection = T::Connection>,
{
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            connections: self.connections.clone(),
            backend: self.backend.clone(),
            status: self.status.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T, E> PlaybackController<T, E>
where
    T: VoiceTransport,
    E: EncodeBackend<Connection = T::Connection>,
{
    pub fn new(
        transport: Arc<T>,
        backend: Arc<E>,
        status: Arc<dyn StatusSink>,
        options: PlayerOptions,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new(
                options.max_queue_size,
                options.self_deafen,
            )),
            connections: Arc::new(ConnectionManager::new(transport)),
            backend,
            status,
            options: Arc::new(options),
        }
    }

    fn session(&self, guild_id: GuildId) -> SharedSession<E> {
        self.sessions.get_or_create(guild_id)
    }

    // Conexión

    /// Une el bot a un canal de voz
    pub async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<ConnectOutcome, ConnectionError> {
        let session = self.session(guild_id);
        let mut guard = session.lock().await;

        match self.connections.connect(guild_id, &mut *guard, channel_id).await? {
            ConnectOutcome::AlreadyConnected => Err(ConnectionError::AlreadyInChannel),
            outcome => Ok(outcome),
        }
    }

    /// Detiene lo que esté sonando y sale del canal. La cola se conserva.
    pub async fn leave(&self, guild_id: GuildId) -> Result<(), ConnectionError> {
        let session = self.session(guild_id);
        let mut guard = session.lock().await;

        if guard.is_streaming() {
            Self::halt(&mut guard).await;
        }
        self.connections.disconnect(guild_id, &mut *guard).await
    }

    /// La plataforma cerró la conexión por fuera (kick, canal borrado)
    pub async fn forget_connection(&self, guild_id: GuildId) {
        let Some(session) = self.sessions.get(guild_id) else {
            return;
        };
        let mut guard = session.lock().await;

        if guard.is_streaming() {
            Self::halt(&mut guard).await;
        }
        if guard.voice.take().is_some() {
            info!("🔌 Conexión de voz descartada en guild {}", guild_id);
        }
    }

    pub async fn set_muted(&self, guild_id: GuildId, muted: bool) -> Result<(), ConnectionError> {
        let session = self.session(guild_id);
        let mut guard = session.lock().await;
        guard.muted = muted;

        if guard.is_connected() {
            self.connections.apply_flags(&*guard).await?;
        }
        info!("🔇 Silencio = {} en guild {}", muted, guild_id);
        Ok(())
    }

    pub async fn set_deafened(
        &self,
        guild_id: GuildId,
        deafened: bool,
    ) -> Result<(), ConnectionError> {
        let session = self.session(guild_id);
        let mut guard = session.lock().await;
        guard.deafened = deafened;

        if guard.is_connected() {
            self.connections.apply_flags(&*guard).await?;
        }
        info!("🙉 Ensordecido = {} en guild {}", deafened, guild_id);
        Ok(())
    }

    pub async fn set_status_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        let session = self.session(guild_id);
        session.lock().await.status_channel = Some(channel_id);
    }

    // Reproducción

    /// Reproduce una entrada o, si ya hay algo sonando, la agrega a la cola
    pub async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        entry: QueueEntry,
    ) -> Result<PlayOutcome, VoiceError> {
        let session = self.session(guild_id);
        let mut guard = session.lock().await;

        if guard.is_streaming() {
            let position = guard.queue.add(entry)?;
            return Ok(PlayOutcome::Queued { position });
        }

        if guard.muted {
            return Err(PlaybackError::Muted.into());
        }

        // Con la sesión aún Idle se permite mover una conexión ociosa de canal
        self.connections.connect(guild_id, &mut *guard, channel_id).await?;

        guard.state = PlaybackState::Connecting;
        let generation = guard.begin_attempt();
        drop(guard);

        match self.start_attempt(guild_id, &session, generation, entry).await {
            Ok(Some(rx)) => {
                self.spawn_playback_task(guild_id, session, generation, rx);
                Ok(PlayOutcome::Started)
            }
            Ok(None) => Ok(PlayOutcome::Cancelled),
            Err(e) => {
                let mut guard = session.lock().await;
                if guard.is_current(generation) {
                    guard.state = PlaybackState::Idle;
                }
                Err(e.into())
            }
        }
    }

    /// Saca la primera entrada de la cola y la reproduce (p. ej. tras copiar una cola)
    pub async fn play_next_queued(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<PlayOutcome, VoiceError> {
        let session = self.session(guild_id);
        let entry = {
            let mut guard = session.lock().await;
            if guard.is_streaming() {
                return Err(PlaybackError::AlreadyStreaming.into());
            }
            guard.queue.pop_next().ok_or(PlaybackError::InvalidIndex(0))?
        };

        self.play(guild_id, channel_id, entry).await
    }

    /// Reproduce la primera entrada que logre arrancar y encola el resto.
    ///
    /// Las entradas con fuente inválida se saltan. Cualquier otro error
    /// (silenciado, conexión) descarta la lista completa.
    pub async fn play_batch(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        entries: Vec<QueueEntry>,
    ) -> Result<BatchOutcome, VoiceError> {
        let mut pending = entries.into_iter();
        let mut skipped = 0;
        let mut last_error = PlaybackError::InvalidIndex(0);

        while let Some(entry) = pending.next() {
            match self.play(guild_id, channel_id, entry.clone()).await {
                Ok(outcome) => {
                    let rest: Vec<QueueEntry> = pending.by_ref().collect();
                    let enqueued = if rest.is_empty() {
                        0
                    } else {
                        match self.enqueue_many(guild_id, rest).await {
                            Ok(added) => added,
                            Err(e) => {
                                warn!("⚠️ Resto de la playlist no encolado en guild {}: {}", guild_id, e);
                                0
                            }
                        }
                    };

                    return Ok(BatchOutcome {
                        first: entry,
                        outcome,
                        enqueued,
                        skipped,
                    });
                }
                Err(VoiceError::Playback(PlaybackError::InvalidSource(reason))) => {
                    warn!("⚠️ Saltando {}: {}", entry.title(), reason);
                    skipped += 1;
                    last_error = PlaybackError::InvalidSource(reason);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.into())
    }

    /// Agrega muchas entradas soltando el lock entre cada una
    pub async fn enqueue_many(
        &self,
        guild_id: GuildId,
        entries: Vec<QueueEntry>,
    ) -> Result<usize, PlaybackError> {
        let session = self.session(guild_id);
        let mut added = 0;

        for entry in entries {
            let result = session.lock().await.queue.add(entry);
            match result {
                Ok(_) => added += 1,
                Err(e) if added == 0 => return Err(e),
                Err(e) => {
                    warn!("⚠️ Playlist truncada tras {} canciones: {}", added, e);
                    break;
                }
            }
            tokio::task::yield_now().await;
        }

        info!("➕ Agregadas {} canciones a la cola de guild {}", added, guild_id);
        Ok(added)
    }

    /// Detiene el stream actual sin tocar la cola ni evaluar la repetición
    pub async fn stop(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let session = self.sessions.get(guild_id).ok_or(PlaybackError::NotStreaming)?;
        let mut guard = session.lock().await;

        if !guard.is_streaming() {
            return Err(PlaybackError::NotStreaming);
        }

        Self::halt(&mut guard).await;
        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        Ok(())
    }

    /// Termina el stream actual; la tarea de fondo avanza como en un fin natural
    pub async fn skip(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let session = self.sessions.get(guild_id).ok_or(PlaybackError::NotStreaming)?;
        let mut guard = session.lock().await;

        let Some(pipeline) = guard.pipeline.as_ref() else {
            return Err(PlaybackError::NotStreaming);
        };

        pipeline.signal.complete(StreamOutcome::SkippedByUser);
        pipeline.encoder.stop();
        guard.state = PlaybackState::Stopping;

        info!("⏭️ Saltando canción en guild {}", guild_id);
        Ok(())
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let session = self.sessions.get(guild_id).ok_or(PlaybackError::NotStreaming)?;
        let mut guard = session.lock().await;

        let stream = match (&guard.pipeline, guard.state) {
            (Some(pipeline), PlaybackState::Playing | PlaybackState::Paused) => &pipeline.stream,
            _ => return Err(PlaybackError::NotStreaming),
        };

        if stream.is_paused() {
            return Err(PlaybackError::AlreadyPaused);
        }
        stream.set_paused(true);
        guard.state = PlaybackState::Paused;

        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let session = self.sessions.get(guild_id).ok_or(PlaybackError::NotStreaming)?;
        let mut guard = session.lock().await;

        let stream = match (&guard.pipeline, guard.state) {
            (Some(pipeline), PlaybackState::Playing | PlaybackState::Paused) => &pipeline.stream,
            _ => return Err(PlaybackError::NotStreaming),
        };

        if !stream.is_paused() {
            return Err(PlaybackError::AlreadyPlaying);
        }
        stream.set_paused(false);
        guard.state = PlaybackState::Playing;

        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(())
    }

    // Cola

    pub async fn set_repeat(&self, guild_id: GuildId, mode: RepeatMode) {
        let session = self.session(guild_id);
        session.lock().await.repeat = mode;
        info!("🔁 Repetición = {} en guild {}", mode.as_str(), guild_id);
    }

    pub async fn toggle_shuffle(&self, guild_id: GuildId) -> bool {
        let session = self.session(guild_id);
        let enabled = session.lock().await.queue.toggle_shuffle();
        enabled
    }

    pub async fn queue(&self, guild_id: GuildId) -> QueueSnapshot {
        let session = self.session(guild_id);
        let snapshot = session.lock().await.snapshot();
        snapshot
    }

    pub async fn remove(&self, guild_id: GuildId, index: usize) -> Result<QueueEntry, PlaybackError> {
        let session = self.session(guild_id);
        let removed = session.lock().await.queue.remove(index);
        removed
    }

    pub async fn clear_queue(&self, guild_id: GuildId) -> usize {
        let session = self.session(guild_id);
        let removed = session.lock().await.queue.clear();
        removed
    }

    /// Copia la canción actual y la cola de otra guild al final de esta
    pub async fn copy_queue(&self, from: GuildId, to: GuildId) -> Result<usize, PlaybackError> {
        if from == to {
            return Ok(0);
        }

        // Nunca se sostienen los dos locks a la vez
        let entries: Vec<QueueEntry> = {
            let Some(source) = self.sessions.get(from) else {
                return Ok(0);
            };
            let guard = source.lock().await;
            guard
                .now_playing
                .iter()
                .cloned()
                .chain(guard.queue.iter().cloned())
                .collect()
        };

        if entries.is_empty() {
            return Ok(0);
        }

        info!("📋 Copiando {} canciones de guild {} a {}", entries.len(), from, to);
        self.enqueue_many(to, entries).await
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Option<NowPlaying> {
        let session = self.sessions.get(guild_id)?;
        let guard = session.lock().await;

        let entry = guard.now_playing.clone()?;
        let pipeline = guard.pipeline.as_ref()?;

        Some(NowPlaying {
            entry,
            position: pipeline.stream.playback_position().await,
            paused: pipeline.stream.is_paused(),
        })
    }

    pub async fn state(&self, guild_id: GuildId) -> PlaybackState {
        match self.sessions.get(guild_id) {
            Some(session) => session.lock().await.state,
            None => PlaybackState::Idle,
        }
    }

    pub async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.sessions.get(guild_id) {
            Some(session) => session.lock().await.is_connected(),
            None => false,
        }
    }

    /// Detiene y desconecta todas las guilds
    pub async fn shutdown(&self) {
        let guilds = self.sessions.guild_ids();
        info!("⚠️ Cerrando {} sesiones de voz", guilds.len());

        join_all(guilds.into_iter().map(|guild_id| async move {
            match self.leave(guild_id).await {
                Ok(()) | Err(ConnectionError::NotConnected) => {}
                Err(e) => warn!("⚠️ Error al cerrar guild {}: {}", guild_id, e),
            }
        }))
        .await;
    }

    // Internos

    /// Corta el intento en curso: señal, codificador y pipeline.
    /// La cola queda intacta y no se evalúa la repetición.
    async fn halt(guard: &mut MutexGuard<'_, GuildSession<E>>) {
        if let Some(pipeline) = guard.pipeline.as_ref() {
            pipeline.signal.complete(StreamOutcome::StoppedByUser);
        }
        guard.teardown();
        guard.begin_attempt();
        guard.state = PlaybackState::Idle;

        if let Some(link) = guard.voice.as_ref() {
            link.connection.set_speaking(false).await;
        }
    }

    /// Arranca el codificador fuera del lock y luego instala el pipeline.
    ///
    /// Devuelve `Ok(None)` si el intento fue invalidado (stop/leave) mientras
    /// el codificador arrancaba.
    async fn start_attempt(
        &self,
        guild_id: GuildId,
        session: &SharedSession<E>,
        generation: u64,
        entry: QueueEntry,
    ) -> Result<Option<CompletionReceiver>, PlaybackError> {
        debug!("🎼 Preparando stream para: {}", entry.title());

        let encoder = self
            .backend
            .encode(&entry.metadata.stream_url, &self.options.encode)
            .await
            .map_err(|e| PlaybackError::InvalidSource(e.to_string()))?;

        let mut guard = session.lock().await;

        if !guard.is_current(generation) {
            debug!("Intento {} cancelado antes de empezar", generation);
            encoder.cleanup();
            return Ok(None);
        }

        let Some(link) = guard.voice.as_ref() else {
            encoder.cleanup();
            return Err(PlaybackError::NotConnected);
        };

        let (signal, rx) = CompletionSignal::new();
        let stream = match self
            .backend
            .stream(&encoder, &link.connection, signal.clone())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                encoder.cleanup();
                return Err(PlaybackError::InvalidSource(e.to_string()));
            }
        };
        link.connection.set_speaking(true).await;

        info!("🎵 Reproduciendo: {} en guild {}", entry.title(), guild_id);
        let status_channel = guard.status_channel;
        guard.install(
            entry.clone(),
            Pipeline {
                encoder,
                stream,
                signal,
            },
        );
        drop(guard);

        self.announce(guild_id, status_channel, StatusEvent::NowPlaying(entry))
            .await;
        Ok(Some(rx))
    }

    fn spawn_playback_task(
        &self,
        guild_id: GuildId,
        session: SharedSession<E>,
        generation: u64,
        rx: CompletionReceiver,
    ) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller
                .run_playback_loop(guild_id, session, generation, rx)
                .await;
        });
    }

    /// Bucle de la guild: espera el fin de cada stream y arranca el siguiente
    async fn run_playback_loop(
        &self,
        guild_id: GuildId,
        session: SharedSession<E>,
        generation: u64,
        mut rx: CompletionReceiver,
    ) {
        loop {
            let outcome = match rx.await {
                Ok(outcome) => outcome,
                Err(_) => StreamOutcome::Faulted("la señal de finalización se descartó".into()),
            };
            debug!("Stream terminado en guild {}: {:?}", guild_id, outcome);

            let mut guard = session.lock().await;
            if !guard.is_current(generation) {
                debug!("Tarea de reproducción obsoleta en guild {}", guild_id);
                return;
            }

            let finished = guard.teardown();
            let mut candidate = match outcome {
                StreamOutcome::StoppedByUser => {
                    guard.state = PlaybackState::Idle;
                    return;
                }
                StreamOutcome::Faulted(reason) => {
                    error!("❌ Error de stream en guild {}: {}", guild_id, reason);
                    let title = finished
                        .as_ref()
                        .map(|e| e.title().to_string())
                        .unwrap_or_default();
                    let channel = guard.status_channel;
                    // Sin reintento: la entrada fallida no vuelve a la cola
                    let next = guard.select_next(None);
                    guard.state = PlaybackState::Connecting;
                    drop(guard);
                    self.announce(guild_id, channel, StatusEvent::Fault { title, reason })
                        .await;
                    guard = session.lock().await;
                    if !guard.is_current(generation) {
                        return;
                    }
                    next
                }
                StreamOutcome::Completed | StreamOutcome::SkippedByUser => {
                    guard.select_next(finished)
                }
            };

            rx = loop {
                let Some(entry) = candidate.take() else {
                    self.finish_queue(guild_id, guard).await;
                    return;
                };

                guard.state = PlaybackState::Connecting;
                let channel = guard.status_channel;
                drop(guard);

                let title = entry.title().to_string();
                match self.start_attempt(guild_id, &session, generation, entry).await {
                    Ok(Some(next_rx)) => break next_rx,
                    Ok(None) => return,
                    Err(PlaybackError::NotConnected) => {
                        let mut guard = session.lock().await;
                        if guard.is_current(generation) {
                            warn!("⚠️ Conexión perdida en guild {}, reproducción detenida", guild_id);
                            guard.state = PlaybackState::Idle;
                        }
                        return;
                    }
                    Err(e) => {
                        warn!("⚠️ No se pudo reproducir {}: {}", title, e);
                        self.announce(
                            guild_id,
                            channel,
                            StatusEvent::Fault {
                                title,
                                reason: e.to_string(),
                            },
                        )
                        .await;

                        guard = session.lock().await;
                        if !guard.is_current(generation) {
                            return;
                        }
                        candidate = guard.queue.pop_next();
                    }
                }
            };
        }
    }

    /// Fin natural de la cola: queda Idle y, si está configurado, sale del canal
    async fn finish_queue(&self, guild_id: GuildId, mut guard: MutexGuard<'_, GuildSession<E>>) {
        guard.state = PlaybackState::Idle;
        let channel = guard.status_channel;

        if let Some(link) = guard.voice.as_ref() {
            link.connection.set_speaking(false).await;
        }

        if self.options.leave_on_queue_end {
            if let Err(e) = self.connections.disconnect(guild_id, &mut *guard).await {
                warn!("⚠️ Error al salir del canal en guild {}: {}", guild_id, e);
            }
        }
        drop(guard);

        info!("📭 Cola terminada en guild {}", guild_id);
        self.announce(guild_id, channel, StatusEvent::QueueFinished).await;
    }

    async fn announce(&self, guild_id: GuildId, channel: Option<ChannelId>, event: StatusEvent) {
        match channel {
            Some(channel_id) => self.status.announce(guild_id, channel_id, event).await,
            None => debug!("Sin canal de estado en guild {}: {:?}", guild_id, event),
        }
    }
}
