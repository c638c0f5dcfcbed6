//! # Audio Module
//!
//! Per-guild voice playback engine for Open Music Voice.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Controller
//! - Owns every guild session and the background playback loop
//! - Serialises all session mutation through one lock per guild
//! - Applies the repeat policy and advances the queue on track end
//!
//! ### [`session`] - Guild Sessions
//! - Voice link, active pipeline, queue and playback state per guild
//! - Generation counter that invalidates stale background tasks
//!
//! ### [`connection`] - Voice Connections
//! - Join, move (only while idle) and leave voice channels
//!
//! ### [`queue`] - Queue Management
//! - Bounded FIFO with an optional shuffle permutation
//! - Repeat modes: off, queue, track
//!
//! ### [`driver`] - Collaborator Seams
//! - Transport, encoder and status traits plus the completion signal
//!
//! ### [`songbird_driver`] - Songbird Backend
//! - Production transport and encoder on top of Songbird
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_music_voice::audio::queue::RepeatMode;
//! use open_music_voice::audio::SongbirdController;
//! use serenity::all::{ChannelId, GuildId};
//!
//! # async fn example(player: SongbirdController, entry: open_music_voice::audio::queue::QueueEntry) -> anyhow::Result<()> {
//! let guild_id = GuildId::new(1);
//! player.play(guild_id, ChannelId::new(2), entry).await?;
//! player.set_repeat(guild_id, RepeatMode::Queue).await;
//! player.skip(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod driver;
pub mod player;
pub mod queue;
pub mod session;
pub mod songbird_driver;

/// Controlador de producción sobre Songbird
pub type SongbirdController =
    player::PlaybackController<songbird_driver::SongbirdTransport, songbird_driver::SongbirdEncoder>;
