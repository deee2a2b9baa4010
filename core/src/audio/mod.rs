// Audio capture, playback and analysis

#[cfg(feature = "mic")]
pub mod mic;

#[cfg(feature = "mic")]
pub use mic::{MicConfig, MicSource};

/// What a capture source emits downstream.
#[derive(Clone, Debug)]
pub enum CaptureEvent {
    /// One frame of mono f32 samples at the configured rate.
    Frame(Vec<f32>),
    /// The device failed; no further frames will arrive.
    Fault(String),
}

#[cfg(feature = "playback")]
pub mod playback;

#[cfg(feature = "playback")]
pub use playback::{PlaybackConfig, PlaybackEngine};

pub mod player;
pub mod volume;

pub use player::{PlaybackEvent, PlaybackHandle, ReplyPlayer};
pub use volume::compute_volume;
