//! HTTP client for the speech gateway.
//!
//! The gateway exposes one route per pipeline stage so the caller can stop
//! between stages; [`SpeechGateway`] is the seam that lets the orchestrator
//! run against a mock in tests.

use crate::utterance::AudioUtterance;
use crate::{Result, VoiceError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Synthesized reply audio plus the metadata needed to play or re-serve it.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesizedReply {
    pub audio: Vec<u8>,
    pub content_type: String,
    pub content_length: usize,
}

/// The three remote stages of the reply pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechGateway: Send + Sync {
    /// Transcribe a captured utterance. An inaudible or empty utterance
    /// yields an empty transcript, not an error.
    async fn transcribe(&self, utterance: &AudioUtterance) -> Result<String>;

    /// Produce the assistant's textual reply to a transcript.
    async fn complete(&self, transcript: &str) -> Result<String>;

    /// Render reply text to audio.
    async fn synthesize(&self, reply: &str) -> Result<SynthesizedReply>;
}

#[derive(Clone, Debug)]
pub struct HttpGatewayConfig {
    /// Gateway base URL, e.g. `http://localhost:8080`
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        let base_url = std::env::var("GATEWAY_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        let timeout_ms = std::env::var("GATEWAY_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30_000);
        Self {
            base_url,
            request_timeout: Duration::from_millis(timeout_ms),
        }
    }
}

pub struct HttpGateway {
    config: HttpGatewayConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TextBody {
    text: String,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VoiceError::Pipeline(format!(
                "gateway returned {status}: {body}"
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl SpeechGateway for HttpGateway {
    async fn transcribe(&self, utterance: &AudioUtterance) -> Result<String> {
        let mime = utterance.mime();
        let part = reqwest::multipart::Part::bytes(utterance.to_wav_bytes())
            .file_name(format!("utterance.{}", mime.subtype()))
            .mime_str(&mime.content_type())
            .map_err(|e| VoiceError::Pipeline(format!("invalid audio mime: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("audio", part)
            .text("type", mime.subtype().to_string());

        let resp = self
            .http
            .post(self.url("/api/stt"))
            .multipart(form)
            .send()
            .await?;
        let body: TextBody = Self::check(resp).await?.json().await?;
        debug!(target = "gateway_client", transcript = %body.text, "Transcribed");
        Ok(body.text)
    }

    async fn complete(&self, transcript: &str) -> Result<String> {
        let resp = self
            .http
            .post(self.url("/api/complete"))
            .json(&serde_json::json!({ "text": transcript }))
            .send()
            .await?;
        let body: TextBody = Self::check(resp).await?.json().await?;
        Ok(body.text)
    }

    async fn synthesize(&self, reply: &str) -> Result<SynthesizedReply> {
        let resp = self
            .http
            .post(self.url("/api/tts"))
            .json(&serde_json::json!({ "text": reply }))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let audio = resp.bytes().await?.to_vec();
        if audio.is_empty() {
            return Err(VoiceError::Pipeline("gateway returned empty audio".into()));
        }
        let content_length = audio.len();
        Ok(SynthesizedReply {
            audio,
            content_type,
            content_length,
        })
    }
}
