// Turn taking: frame classification and the speech/silence state machine

pub mod classifier;
pub mod controller;

pub use classifier::{EnergyClassifier, SpeechClassifier};
#[cfg(feature = "vad")]
pub use classifier::WebRtcClassifier;
pub use controller::{TurnConfig, TurnController, TurnEvent};
