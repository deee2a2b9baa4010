//! OpenAI-backed STT, completion and TTS.

use crate::providers::{CompletionBackend, SttBackend, TtsAudio, TtsBackend};
use crate::{GatewayError, Result};
use anwana_core::AudioMime;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub stt_model: String,
    pub completion_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_speed: f32,
    pub request_timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let stt_model =
            std::env::var("OPENAI_STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        let completion_model =
            std::env::var("OPENAI_COMPLETION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let tts_model = std::env::var("OPENAI_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let tts_voice = std::env::var("OPENAI_TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());
        let tts_speed = std::env::var("OPENAI_TTS_SPEED")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(1.0);
        let timeout_ms = std::env::var("OPENAI_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30_000);
        Self {
            api_key,
            base_url,
            stt_model,
            completion_model,
            tts_model,
            tts_voice,
            tts_speed,
            request_timeout: Duration::from_millis(timeout_ms),
        }
    }
}

pub struct OpenAiClient {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(GatewayError::Backend(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }
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
            return Err(GatewayError::Backend(format!(
                "openai returned {status}: {body}"
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl SttBackend for OpenAiClient {
    async fn transcribe(&self, audio: Vec<u8>, mime: AudioMime) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(format!("utterance.{}", mime.subtype()))
            .mime_str(&mime.content_type())
            .map_err(|e| GatewayError::Backend(format!("invalid mime: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.stt_model.clone());

        let resp = self
            .http
            .post(self.url("/audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;
        let body = Self::check(resp).await?.text().await?;

        // The endpoint answers `{"text": ...}` by default but plain text
        // when a response_format is configured upstream. Accept both.
        let text = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => value
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
            Err(_) => body,
        };
        debug!(target = "openai", transcript = %text, "Transcribed");
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.config.completion_model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_text },
            ],
        });
        let resp = self
            .http
            .post(self.url("/chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;
        let value: serde_json::Value = Self::check(resp).await?.json().await?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                GatewayError::Backend("completion response missing message content".to_string())
            })?;
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl TtsBackend for OpenAiClient {
    async fn synthesize(&self, text: &str) -> Result<TtsAudio> {
        let payload = serde_json::json!({
            "model": self.config.tts_model,
            "voice": self.config.tts_voice,
            "speed": self.config.tts_speed,
            "input": text,
        });
        let resp = self
            .http
            .post(self.url("/audio/speech"))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
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
            return Err(GatewayError::Backend("tts returned no audio".to_string()));
        }
        Ok(TtsAudio {
            audio,
            content_type,
        })
    }
}
