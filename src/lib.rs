//! # Open Music Voice
//!
//! Per-guild voice playback engine for the Open Music Discord bot: voice
//! connections, a bounded queue with shuffle and repeat, a background
//! playback loop per guild and metadata resolvers for the supported
//! streaming sources.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
