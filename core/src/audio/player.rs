//! The playback seam between the voice session and the audio device.
//!
//! `VoiceSession` drives playback through [`ReplyPlayer`] so the turn-taking
//! logic can be exercised without an output device; the rodio-backed
//! [`PlaybackEngine`](crate::audio::playback::PlaybackEngine) is the real
//! implementation.

use crate::pipeline::SynthesizedReply;
use crate::Result;

/// Identifier for one playback instance. Each `play` call gets a fresh
/// handle and its own underlying output resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(pub u64);

/// Events emitted by a player while rendering a reply.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    /// Live output loudness in [0, ~1], sampled on a fixed cadence.
    Volume(f32),
    /// Playback drained naturally.
    Ended(PlaybackHandle),
    /// Decode/output failure; recoverable, treated as if playback ended.
    Failed(PlaybackHandle, String),
}

/// Renders synthesized replies and supports graceful interruption.
pub trait ReplyPlayer: Send {
    /// Decode and start playing a reply. Returns the handle identifying this
    /// playback instance.
    fn play(&mut self, reply: SynthesizedReply) -> Result<PlaybackHandle>;

    /// Request an interrupt-with-fade of the given playback instance. The
    /// gain ramps to near-silence over a bounded duration before the
    /// resources are released; an unknown or finished handle is a no-op.
    fn interrupt(&mut self, handle: PlaybackHandle);
}
