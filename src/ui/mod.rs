//! Discord-facing presentation: embeds for playback status and command replies.

pub mod embeds;
