//! Fakes de transporte, codificador y anunciador para probar el
//! controlador sin Discord ni procesos externos.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Notify;

use open_music_voice::{
    audio::{
        driver::{
            CompletionSignal, EncodeBackend, EncodeHandle, EncodeOptions, StatusEvent, StatusSink,
            StreamHandle, StreamOutcome, VoiceConnection, VoiceTransport,
        },
        player::{PlaybackController, PlayerOptions},
        queue::QueueEntry,
    },
    sources::TrackMetadata,
};

pub type TestController = PlaybackController<FakeTransport, FakeBackend>;

// Transporte

#[derive(Default)]
pub struct FakeTransport {
    /// Llamadas a `connect`, incluidas las que siguen esperando
    pub attempts: AtomicUsize,
    pub connects: AtomicUsize,
    pub disconnects: Arc<AtomicUsize>,
    pub flag_changes: Arc<AtomicUsize>,
    pub fail_connect: AtomicBool,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl FakeTransport {
    /// Hace que el próximo `connect` espere hasta que se notifique
    pub fn hold_connect(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock() = Some(notify.clone());
        notify
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        _muted: bool,
        _deafened: bool,
    ) -> Result<FakeConnection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().take();
        if let Some(notify) = hold {
            notify.notified().await;
        }

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(anyhow!("gateway timeout"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);

        Ok(FakeConnection {
            guild_id,
            channel_id: Mutex::new(channel_id),
            speaking: AtomicBool::new(false),
            disconnects: self.disconnects.clone(),
            flag_changes: self.flag_changes.clone(),
        })
    }
}

pub struct FakeConnection {
    pub guild_id: GuildId,
    pub channel_id: Mutex<ChannelId>,
    pub speaking: AtomicBool,
    disconnects: Arc<AtomicUsize>,
    flag_changes: Arc<AtomicUsize>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn change_channel(&self, channel_id: ChannelId, _muted: bool, _deafened: bool) -> Result<()> {
        *self.channel_id.lock() = channel_id;
        self.flag_changes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::SeqCst);
    }
}

// Codificador

/// Backend que guarda la señal vigente de cada guild para que el test
/// decida cuándo y cómo termina cada stream.
#[derive(Default)]
pub struct FakeBackend {
    signals: Mutex<HashMap<GuildId, CompletionSignal>>,
    failing_urls: Mutex<HashSet<String>>,
    hold: Mutex<Option<Arc<Notify>>>,
    pub encodes: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
    pub cleanups: Arc<AtomicUsize>,
}

impl FakeBackend {
    /// Termina el stream actual de la guild. `false` si no había señal
    /// o ya estaba escrita.
    pub fn finish(&self, guild_id: GuildId, outcome: StreamOutcome) -> bool {
        match self.signals.lock().get(&guild_id) {
            Some(signal) => signal.complete(outcome),
            None => false,
        }
    }

    pub fn fail_encode_for(&self, stream_url: &str) {
        self.failing_urls.lock().insert(stream_url.to_string());
    }

    /// Hace que el próximo `encode` espere hasta que se notifique
    pub fn hold_encode(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock() = Some(notify.clone());
        notify
    }

    pub fn encode_count(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EncodeBackend for FakeBackend {
    type Connection = FakeConnection;
    type Encoder = FakeEncoder;
    type Stream = FakeStream;

    async fn encode(&self, stream_url: &str, _options: &EncodeOptions) -> Result<FakeEncoder> {
        let hold = self.hold.lock().take();
        if let Some(notify) = hold {
            notify.notified().await;
        }

        self.encodes.fetch_add(1, Ordering::SeqCst);
        if self.failing_urls.lock().contains(stream_url) {
            return Err(anyhow!("ffmpeg exited with status 1"));
        }

        Ok(FakeEncoder {
            stream_url: stream_url.to_string(),
            stops: self.stops.clone(),
            cleanups: self.cleanups.clone(),
        })
    }

    async fn stream(
        &self,
        _encoder: &FakeEncoder,
        connection: &FakeConnection,
        signal: CompletionSignal,
    ) -> Result<FakeStream> {
        self.signals.lock().insert(connection.guild_id, signal);
        Ok(FakeStream::default())
    }
}

pub struct FakeEncoder {
    pub stream_url: String,
    stops: Arc<AtomicUsize>,
    cleanups: Arc<AtomicUsize>,
}

impl EncodeHandle for FakeEncoder {
    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeStream {
    paused: AtomicBool,
}

#[async_trait]
impl StreamHandle for FakeStream {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    async fn playback_position(&self) -> Duration {
        Duration::from_secs(42)
    }
}

// Anuncios

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(GuildId, StatusEvent)>>,
}

impl RecordingSink {
    pub fn events(&self, guild_id: GuildId) -> Vec<StatusEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn faults(&self, guild_id: GuildId) -> Vec<(String, String)> {
        self.events(guild_id)
            .into_iter()
            .filter_map(|e| match e {
                StatusEvent::Fault { title, reason } => Some((title, reason)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn announce(&self, guild_id: GuildId, _channel_id: ChannelId, event: StatusEvent) {
        self.events.lock().push((guild_id, event));
    }
}

// Arnés

pub struct Harness {
    pub player: TestController,
    pub transport: Arc<FakeTransport>,
    pub backend: Arc<FakeBackend>,
    pub status: Arc<RecordingSink>,
}

pub fn harness(options: PlayerOptions) -> Harness {
    let transport = Arc::new(FakeTransport::default());
    let backend = Arc::new(FakeBackend::default());
    let status = Arc::new(RecordingSink::default());

    let player = PlaybackController::new(transport.clone(), backend.clone(), status.clone(), options);

    Harness {
        player,
        transport,
        backend,
        status,
    }
}

pub fn default_harness() -> Harness {
    harness(PlayerOptions::default())
}

pub const GUILD: GuildId = GuildId::new(1);
pub const OTHER_GUILD: GuildId = GuildId::new(2);
pub const VOICE: ChannelId = ChannelId::new(10);
pub const OTHER_VOICE: ChannelId = ChannelId::new(11);
pub const TEXT: ChannelId = ChannelId::new(20);

pub fn entry(title: &str) -> QueueEntry {
    let metadata = TrackMetadata::new(title, format!("https://example.com/{}", title))
        .with_stream_url(format!("fake://{}", title))
        .with_duration(Duration::from_secs(180));
    QueueEntry::new(metadata, "Test", 0x000000, UserId::new(7))
}

pub fn titles(entries: &[QueueEntry]) -> Vec<String> {
    entries.iter().map(|e| e.title().to_string()).collect()
}

/// Reintenta `check` hasta que devuelva `true` o pasen dos segundos
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Espera a que la guild esté reproduciendo `title`
pub async fn wait_for_now_playing(player: &TestController, guild_id: GuildId, title: &str) -> bool {
    eventually(move || async move {
        player
            .queue(guild_id)
            .await
            .now_playing
            .map(|e| e.title() == title)
            .unwrap_or(false)
    })
    .await
}
