//! Speech/silence turn controller.
//!
//! Consumes capture frames, debounces the classifier decision in both
//! directions, and emits utterance boundaries. No IO here: the caller feeds
//! frames in and handles the events, which keeps the state machine fully
//! testable with scripted classifiers.

use crate::audio::compute_volume;
use crate::turn::classifier::SpeechClassifier;
use crate::utterance::{AudioMime, AudioUtterance};
use crate::Result;
use std::collections::VecDeque;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct TurnConfig {
    /// Sample rate the incoming frames are captured at
    pub sample_rate_hz: u32,
    /// Duration of one frame in milliseconds
    pub frame_ms: u32,
    /// Classifier probability at or above which a frame counts as voiced
    pub threshold: f32,
    /// Consecutive voiced duration required to declare speech start
    pub min_start_ms: u32,
    /// Unvoiced duration after the last voiced frame to declare speech end
    pub hangover_ms: u32,
    /// Hard cap on utterance length; the turn ends here even mid-speech
    pub max_utterance_ms: u32,
    /// Recent audio retained before speech start so onsets are not clipped
    pub pre_roll_ms: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        fn env_u32(key: &str, default: u32) -> u32 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(default)
        }
        let threshold = std::env::var("TURN_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(0.6);
        Self {
            sample_rate_hz: 16_000,
            frame_ms: 20,
            threshold,
            min_start_ms: env_u32("TURN_MIN_START_MS", 120),
            hangover_ms: env_u32("TURN_HANGOVER_MS", 700),
            max_utterance_ms: env_u32("TURN_MAX_UTTERANCE_MS", 15_000),
            pre_roll_ms: env_u32("TURN_PRE_ROLL_MS", 300),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TurnEvent {
    /// Emitted for every frame, voiced or not. Drives live volume feedback.
    FrameProcessed { volume: f32 },
    /// The debounced start of a user turn.
    SpeechStart,
    /// The turn is over; the utterance includes pre-roll and hangover audio.
    SpeechEnd { utterance: AudioUtterance },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Phase {
    WaitingForSpeech,
    InSpeech,
}

pub struct TurnController<C> {
    cfg: TurnConfig,
    classifier: C,
    phase: Phase,
    consec_voiced: usize,
    hangover_left: usize,
    /// Rolling window of recent frames while waiting for speech.
    pre_roll: VecDeque<Vec<f32>>,
    utterance: Vec<f32>,
    // Derived frame counts
    min_start_frames: usize,
    hangover_frames: usize,
    max_utterance_frames: usize,
    pre_roll_frames: usize,
}

impl<C: SpeechClassifier> TurnController<C> {
    pub fn new(cfg: TurnConfig, classifier: C) -> Self {
        let frame_ms = cfg.frame_ms.max(1);
        let frames = |ms: u32| ((ms + frame_ms - 1) / frame_ms) as usize;
        let min_start_frames = frames(cfg.min_start_ms).max(1);
        let hangover_frames = frames(cfg.hangover_ms).max(1);
        let max_utterance_frames = frames(cfg.max_utterance_ms).max(1);
        let pre_roll_frames = frames(cfg.pre_roll_ms);
        Self {
            cfg,
            classifier,
            phase: Phase::WaitingForSpeech,
            consec_voiced: 0,
            hangover_left: 0,
            pre_roll: VecDeque::with_capacity(pre_roll_frames + 1),
            utterance: Vec::new(),
            min_start_frames,
            hangover_frames,
            max_utterance_frames,
            pre_roll_frames,
        }
    }

    /// Feed one capture frame. Returns the events it produced, in order;
    /// the first is always `FrameProcessed`.
    pub fn push_frame(&mut self, frame: &[f32]) -> Result<Vec<TurnEvent>> {
        let mut events = Vec::with_capacity(2);
        if frame.is_empty() {
            return Ok(events);
        }
        events.push(TurnEvent::FrameProcessed {
            volume: compute_volume(frame),
        });

        let voiced = self.classifier.speech_probability(frame)? >= self.cfg.threshold;

        match self.phase {
            Phase::WaitingForSpeech => {
                self.pre_roll.push_back(frame.to_vec());
                while self.pre_roll.len() > self.pre_roll_frames.max(self.min_start_frames) {
                    self.pre_roll.pop_front();
                }

                if voiced {
                    self.consec_voiced += 1;
                    if self.consec_voiced >= self.min_start_frames {
                        info!(target = "turn", "Speech started");
                        self.phase = Phase::InSpeech;
                        self.consec_voiced = 0;
                        self.hangover_left = self.hangover_frames;
                        // Seed the utterance with the buffered pre-roll so
                        // the onset survives the start debounce.
                        for buffered in self.pre_roll.drain(..) {
                            self.utterance.extend_from_slice(&buffered);
                        }
                        events.push(TurnEvent::SpeechStart);
                    }
                } else {
                    self.consec_voiced = 0;
                }
            }
            Phase::InSpeech => {
                self.utterance.extend_from_slice(frame);
                if voiced {
                    self.hangover_left = self.hangover_frames;
                } else {
                    self.hangover_left -= 1;
                    if self.hangover_left == 0 {
                        events.push(self.finish_turn("hangover elapsed"));
                    }
                }
                if self.phase == Phase::InSpeech
                    && self.utterance.len() >= self.max_utterance_frames * frame.len()
                {
                    events.push(self.finish_turn("max utterance length"));
                }
            }
        }

        Ok(events)
    }

    fn finish_turn(&mut self, reason: &str) -> TurnEvent {
        let samples = std::mem::take(&mut self.utterance);
        debug!(
            target = "turn",
            reason,
            samples = samples.len(),
            "Speech ended"
        );
        self.phase = Phase::WaitingForSpeech;
        self.consec_voiced = 0;
        self.hangover_left = 0;
        self.pre_roll.clear();
        TurnEvent::SpeechEnd {
            utterance: AudioUtterance::new(samples, self.cfg.sample_rate_hz, AudioMime::Wav),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VoiceError;

    /// Classifier scripted with a fixed probability sequence.
    struct Scripted {
        probs: Vec<f32>,
        pos: usize,
    }

    impl Scripted {
        fn new(probs: Vec<f32>) -> Self {
            Self { probs, pos: 0 }
        }
    }

    impl SpeechClassifier for Scripted {
        fn speech_probability(&mut self, _frame: &[f32]) -> Result<f32> {
            let p = self.probs.get(self.pos).copied().unwrap_or(0.0);
            self.pos += 1;
            Ok(p)
        }
    }

    fn cfg() -> TurnConfig {
        TurnConfig {
            sample_rate_hz: 16_000,
            frame_ms: 20,
            threshold: 0.5,
            min_start_ms: 60,     // 3 frames
            hangover_ms: 40,      // 2 frames
            max_utterance_ms: 400, // 20 frames
            pre_roll_ms: 40,      // 2 frames
        }
    }

    fn frame() -> Vec<f32> {
        vec![0.1; 320]
    }

    fn run(ctl: &mut TurnController<Scripted>, n: usize) -> Vec<TurnEvent> {
        let mut out = Vec::new();
        for _ in 0..n {
            out.extend(ctl.push_frame(&frame()).unwrap());
        }
        out
    }

    fn starts(events: &[TurnEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, TurnEvent::SpeechStart))
            .count()
    }

    fn ends(events: &[TurnEvent]) -> Vec<&AudioUtterance> {
        events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::SpeechEnd { utterance } => Some(utterance),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn short_burst_below_debounce_never_starts() {
        let mut ctl = TurnController::new(cfg(), Scripted::new(vec![1.0, 1.0, 0.0, 0.0]));
        let events = run(&mut ctl, 4);
        assert_eq!(starts(&events), 0);
    }

    #[test]
    fn debounced_start_then_hangover_end() {
        // 4 voiced, then silence until the hangover runs out.
        let mut probs = vec![1.0; 4];
        probs.extend(vec![0.0; 4]);
        let mut ctl = TurnController::new(cfg(), Scripted::new(probs));
        let events = run(&mut ctl, 8);
        assert_eq!(starts(&events), 1);
        assert_eq!(ends(&events).len(), 1);
    }

    #[test]
    fn utterance_includes_pre_roll() {
        // 3 voiced frames trigger start; the 2-frame pre-roll window holds
        // frames from before the debounce completed.
        let mut probs = vec![1.0; 3];
        probs.extend(vec![0.0; 3]);
        let mut ctl = TurnController::new(cfg(), Scripted::new(probs));
        let events = run(&mut ctl, 6);
        let utterances = ends(&events);
        assert_eq!(utterances.len(), 1);
        // 3 buffered frames (pre-roll window spans the debounce) plus the 2
        // hangover frames, 320 samples each.
        assert_eq!(utterances[0].samples().len(), 5 * 320);
    }

    #[test]
    fn voiced_dip_resets_hangover() {
        // Silence dips shorter than the hangover never end the turn.
        let probs = vec![1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let mut ctl = TurnController::new(cfg(), Scripted::new(probs));
        let events = run(&mut ctl, 9);
        assert_eq!(starts(&events), 1);
        assert_eq!(ends(&events).len(), 1);
    }

    #[test]
    fn max_utterance_forces_end_mid_speech() {
        let mut ctl = TurnController::new(cfg(), Scripted::new(vec![1.0; 30]));
        let events = run(&mut ctl, 30);
        // The classifier never goes silent; only the length cap ends the turn.
        assert_eq!(ends(&events).len(), 1);
    }

    #[test]
    fn every_frame_reports_volume() {
        let mut ctl = TurnController::new(cfg(), Scripted::new(vec![0.0; 5]));
        let events = run(&mut ctl, 5);
        let volumes = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::FrameProcessed { .. }))
            .count();
        assert_eq!(volumes, 5);
    }

    #[test]
    fn classifier_errors_propagate() {
        struct Failing;
        impl SpeechClassifier for Failing {
            fn speech_probability(&mut self, _frame: &[f32]) -> Result<f32> {
                Err(VoiceError::Classifier("bad frame".into()))
            }
        }
        let mut ctl = TurnController::new(cfg(), Failing);
        assert!(ctl.push_frame(&frame()).is_err());
    }
}
