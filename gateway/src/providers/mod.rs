//! Pluggable provider backends.
//!
//! Each pipeline stage sits behind its own trait so providers can be mixed
//! and swapped without touching the HTTP surface. Selection happens once at
//! startup from configuration.

pub mod openai;

use crate::Result;
use anwana_core::AudioMime;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Synthesized audio plus the content type the backend produced it in.
#[derive(Clone, Debug)]
pub struct TtsAudio {
    pub audio: Vec<u8>,
    pub content_type: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SttBackend: Send + Sync {
    /// Transcribe an audio payload. Silence yields an empty string.
    async fn transcribe(&self, audio: Vec<u8>, mime: AudioMime) -> Result<String>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<TtsAudio>;
}

/// Which provider serves each stage. One variant per supported vendor;
/// stages all come from the same vendor for now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
}

impl Provider {
    /// Read `PROVIDER` from the environment; unknown values fall back to
    /// OpenAI with a warning.
    pub fn from_env() -> Self {
        match std::env::var("PROVIDER").as_deref() {
            Ok("openai") | Err(_) => Provider::OpenAi,
            Ok(other) => {
                warn!(target = "providers", provider = other, "Unknown provider, using openai");
                Provider::OpenAi
            }
        }
    }
}

/// The resolved backend set the server runs with.
#[derive(Clone)]
pub struct Backends {
    pub stt: Arc<dyn SttBackend>,
    pub completion: Arc<dyn CompletionBackend>,
    pub tts: Arc<dyn TtsBackend>,
}

impl Backends {
    pub fn for_provider(provider: Provider) -> Result<Self> {
        match provider {
            Provider::OpenAi => {
                let client = Arc::new(openai::OpenAiClient::new(openai::OpenAiConfig::default())?);
                Ok(Self {
                    stt: client.clone(),
                    completion: client.clone(),
                    tts: client,
                })
            }
        }
    }
}

/// Transcription flakes more than the other stages (short clips, codec
/// quirks), so it gets one retry before the request fails.
pub async fn transcribe_with_retry(
    backend: &dyn SttBackend,
    audio: Vec<u8>,
    mime: AudioMime,
) -> Result<String> {
    match backend.transcribe(audio.clone(), mime).await {
        Ok(text) => Ok(text),
        Err(first) => {
            warn!(target = "providers", error = %first, "Transcription failed, retrying once");
            backend.transcribe(audio, mime).await
        }
    }
}
