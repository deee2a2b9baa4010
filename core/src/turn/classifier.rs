//! Per-frame speech classifiers.
//!
//! A classifier maps one capture frame to a speech probability in `[0, 1]`.
//! The energy classifier is always available; the WebRTC classifier (feature
//! `vad`) is the hard-gated variant and reports only 0.0 or 1.0.

use crate::audio::compute_volume;
use crate::Result;
#[cfg(feature = "vad")]
use crate::VoiceError;

/// Frame-level speech detector. `frame` is mono f32 at the rate the
/// implementation was configured for.
pub trait SpeechClassifier {
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32>;
}

impl<T: SpeechClassifier + ?Sized> SpeechClassifier for Box<T> {
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32> {
        (**self).speech_probability(frame)
    }
}

/// RMS-energy classifier. Probability ramps linearly up to the reference
/// level, so a threshold comparison downstream behaves like a plain energy
/// gate while still yielding a graded value.
pub struct EnergyClassifier {
    /// RMS level treated as certain speech.
    reference: f32,
}

impl EnergyClassifier {
    pub fn new(reference: f32) -> Self {
        Self {
            reference: reference.max(f32::EPSILON),
        }
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        let reference = std::env::var("ENERGY_REFERENCE")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(0.05);
        Self::new(reference)
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32> {
        if frame.is_empty() {
            return Ok(0.0);
        }
        Ok((compute_volume(frame) / self.reference).min(1.0))
    }
}

/// WebRTC VAD classifier. Frames must be 10/20/30 ms at 8/16/32/48 kHz;
/// anything else is a classifier error.
#[cfg(feature = "vad")]
pub struct WebRtcClassifier {
    sample_rate_hz: u32,
    /// 0 = Quality .. 3 = VeryAggressive
    mode: u8,
}

#[cfg(feature = "vad")]
impl WebRtcClassifier {
    pub fn new(sample_rate_hz: u32, mode: u8) -> Result<Self> {
        match sample_rate_hz {
            8_000 | 16_000 | 32_000 | 48_000 => Ok(Self {
                sample_rate_hz,
                mode,
            }),
            other => Err(VoiceError::Classifier(format!(
                "unsupported VAD sample rate: {other}"
            ))),
        }
    }
}

#[cfg(feature = "vad")]
impl SpeechClassifier for WebRtcClassifier {
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32> {
        use webrtc_vad::{SampleRate, Vad, VadMode};

        let rate = match self.sample_rate_hz {
            8_000 => SampleRate::Rate8kHz,
            16_000 => SampleRate::Rate16kHz,
            32_000 => SampleRate::Rate32kHz,
            _ => SampleRate::Rate48kHz,
        };
        let mode = match self.mode {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            _ => VadMode::VeryAggressive,
        };

        let pcm: Vec<i16> = frame
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();

        // The underlying detector is cheap to construct and not Send, so a
        // fresh instance per frame keeps the classifier usable from async
        // contexts.
        let mut vad = Vad::new_with_rate_and_mode(rate, mode);
        let voiced = vad.is_voice_segment(&pcm).map_err(|_| {
            VoiceError::Classifier(format!(
                "invalid VAD frame: {} samples at {} Hz",
                pcm.len(),
                self.sample_rate_hz
            ))
        })?;
        Ok(if voiced { 1.0 } else { 0.0 })
    }
}
