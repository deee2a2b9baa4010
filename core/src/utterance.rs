//! Captured utterances and the audio container types they travel in.

use crate::VoiceError;
use std::fmt;
use std::str::FromStr;

/// Supported audio container subtypes for utterance uploads.
///
/// The gateway rejects anything outside this set before touching a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMime {
    Wav,
    Webm,
    Ogg,
    Mp4,
}

impl AudioMime {
    /// The bare subtype string sent in the multipart `type` field.
    pub fn subtype(&self) -> &'static str {
        match self {
            AudioMime::Wav => "wav",
            AudioMime::Webm => "webm",
            AudioMime::Ogg => "ogg",
            AudioMime::Mp4 => "mp4",
        }
    }

    /// Full MIME string, e.g. `audio/wav`.
    pub fn content_type(&self) -> String {
        format!("audio/{}", self.subtype())
    }
}

impl fmt::Display for AudioMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subtype())
    }
}

impl FromStr for AudioMime {
    type Err = VoiceError;

    /// Accepts both bare subtypes (`wav`) and full MIME strings (`audio/wav`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sub = s.trim().strip_prefix("audio/").unwrap_or(s.trim());
        match sub {
            "wav" | "x-wav" | "wave" => Ok(AudioMime::Wav),
            "webm" => Ok(AudioMime::Webm),
            "ogg" => Ok(AudioMime::Ogg),
            "mp4" => Ok(AudioMime::Mp4),
            other => Err(VoiceError::UnsupportedMime(other.to_string())),
        }
    }
}

/// An immutable capture of one user utterance: mono f32 PCM plus the
/// container subtype it will be uploaded as.
///
/// Created by the turn controller on speech end, consumed exactly once by
/// the pipeline orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioUtterance {
    samples: Vec<f32>,
    sample_rate: u32,
    mime: AudioMime,
}

impl AudioUtterance {
    pub fn new(samples: Vec<f32>, sample_rate: u32, mime: AudioMime) -> Self {
        Self {
            samples,
            sample_rate,
            mime,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn mime(&self) -> AudioMime {
        self.mime
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / self.sample_rate as u64
    }

    /// Serialize the capture as a 16-bit PCM WAV container for upload.
    pub fn to_wav_bytes(&self) -> Vec<u8> {
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let byte_rate = self.sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
        let block_align = channels * (bits_per_sample / 8);
        let data_size = (self.samples.len() * 2) as u32;
        let file_size = 36 + data_size;

        let mut out = Vec::with_capacity(44 + data_size as usize);

        // RIFF header
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&file_size.to_le_bytes());
        out.extend_from_slice(b"WAVE");

        // fmt subchunk
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits_per_sample.to_le_bytes());

        // data subchunk
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_size.to_le_bytes());
        for &s in &self.samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_parses_bare_and_full_forms() {
        assert_eq!("wav".parse::<AudioMime>().unwrap(), AudioMime::Wav);
        assert_eq!("audio/webm".parse::<AudioMime>().unwrap(), AudioMime::Webm);
        assert_eq!("audio/ogg".parse::<AudioMime>().unwrap(), AudioMime::Ogg);
        assert_eq!("mp4".parse::<AudioMime>().unwrap(), AudioMime::Mp4);
        assert!("flac".parse::<AudioMime>().is_err());
    }

    #[test]
    fn wav_header_is_well_formed() {
        let utt = AudioUtterance::new(vec![0.0, 0.5, -0.5, 1.0], 16_000, AudioMime::Wav);
        let bytes = utt.to_wav_bytes();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[36..40], b"data");
        // 4 samples * 2 bytes
        assert_eq!(bytes.len(), 44 + 8);
    }

    #[test]
    fn duration_reflects_sample_count() {
        let utt = AudioUtterance::new(vec![0.0; 16_000], 16_000, AudioMime::Wav);
        assert_eq!(utt.duration_ms(), 1000);
    }
}
