// Anwana Core Library
// Voice turn-taking and request pipeline runtime

pub mod audio;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod turn;
pub mod utterance;

// Export core types
pub use audio::{compute_volume, CaptureEvent, PlaybackEvent, PlaybackHandle, ReplyPlayer};
pub use pipeline::{
    HttpGateway, HttpGatewayConfig, PipelineEvent, PipelineHandle, PipelineOrchestrator,
    SpeechGateway, SynthesizedReply,
};
pub use report::{FaultReport, FaultReporter};
pub use session::{SessionEvent, TurnState, VoiceSession, VoiceSessionConfig};
pub use turn::{EnergyClassifier, SpeechClassifier, TurnConfig, TurnController, TurnEvent};
pub use utterance::{AudioMime, AudioUtterance};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    /// Microphone / capture device failure. Fatal to the session.
    #[error("Capture error: {0}")]
    Capture(String),

    /// STT/completion/TTS stage failure or timeout. Recoverable.
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Audio decode/output failure. Recoverable, treated as playback end.
    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Unsupported audio type: {0}")]
    UnsupportedMime(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VoiceError>;
