//! HTTP surface.
//!
//! One route per pipeline stage plus a combined one-shot route and the
//! error sink. Audio responses carry explicit content-type and
//! content-length headers so clients can frame playback without sniffing.

use crate::policy::{clamp_words, CompletionPolicy};
use crate::providers::{transcribe_with_retry, Backends, TtsAudio};
use crate::{GatewayError, Result};
use anwana_core::AudioMime;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Upper bound on uploaded utterance size in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let bind_addr =
            std::env::var("GATEWAY_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let max_upload_bytes = std::env::var("GATEWAY_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(25 * 1024 * 1024);
        Self {
            bind_addr,
            max_upload_bytes,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub backends: Backends,
    pub policy: CompletionPolicy,
}

#[derive(Serialize, Deserialize)]
pub struct TextBody {
    pub text: String,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/speech", post(speech))
        .route("/api/stt", post(stt))
        .route("/api/complete", post(complete))
        .route("/api/tts", post(tts))
        .route("/api/errors", post(report_error))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(config: ServerConfig, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(target = "gateway", addr = %config.bind_addr, "Gateway listening");
    axum::serve(listener, router(state, config.max_upload_bytes)).await?;
    Ok(())
}

/// Pull the audio bytes and declared type out of the multipart form. The
/// type is validated before any backend is touched.
async fn read_audio_form(multipart: &mut Multipart) -> Result<(Vec<u8>, AudioMime)> {
    let mut audio: Option<Vec<u8>> = None;
    let mut subtype: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("audio") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::BadRequest(format!("unreadable audio part: {e}")))?;
                audio = Some(bytes.to_vec());
            }
            Some("type") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| GatewayError::BadRequest(format!("unreadable type part: {e}")))?;
                subtype = Some(text);
            }
            _ => {}
        }
    }

    let audio = audio.ok_or_else(|| GatewayError::BadRequest("missing audio part".to_string()))?;
    if audio.is_empty() {
        return Err(GatewayError::BadRequest("audio part is empty".to_string()));
    }
    let subtype = subtype.unwrap_or_else(|| "wav".to_string());
    let mime = subtype
        .parse::<AudioMime>()
        .map_err(|_| GatewayError::UnsupportedMedia(subtype))?;
    Ok((audio, mime))
}

async fn apply_completion_policy(state: &AppState, transcript: &str) -> Result<String> {
    if transcript.trim().is_empty() {
        return Ok(state.policy.fallback_reply.clone());
    }
    let reply = state
        .backends
        .completion
        .complete(&state.policy.system_prompt(), transcript)
        .await?;
    Ok(clamp_words(&reply, state.policy.max_reply_words))
}

fn audio_response(tts: TtsAudio) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, tts.content_type),
            (header::CONTENT_LENGTH, tts.audio.len().to_string()),
        ],
        tts.audio,
    )
        .into_response()
}

/// POST /api/stt: multipart audio in, transcript out.
async fn stt(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<TextBody>> {
    let (audio, mime) = read_audio_form(&mut multipart).await?;
    let text = transcribe_with_retry(state.backends.stt.as_ref(), audio, mime).await?;
    Ok(Json(TextBody { text }))
}

/// POST /api/complete: transcript in, policy-shaped reply out.
async fn complete(
    State(state): State<AppState>,
    Json(body): Json<TextBody>,
) -> Result<Json<TextBody>> {
    let text = apply_completion_policy(&state, &body.text).await?;
    Ok(Json(TextBody { text }))
}

/// POST /api/tts: reply text in, audio bytes out.
async fn tts(State(state): State<AppState>, Json(body): Json<TextBody>) -> Result<Response> {
    if body.text.trim().is_empty() {
        return Err(GatewayError::BadRequest("text is empty".to_string()));
    }
    let audio = state.backends.tts.synthesize(&body.text).await?;
    Ok(audio_response(audio))
}

/// POST /api/speech: the whole pipeline in one round trip.
async fn speech(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response> {
    let (audio, mime) = read_audio_form(&mut multipart).await?;
    let transcript = transcribe_with_retry(state.backends.stt.as_ref(), audio, mime).await?;
    let reply = apply_completion_policy(&state, &transcript).await?;
    let audio = state.backends.tts.synthesize(&reply).await?;
    Ok(audio_response(audio))
}

/// POST /api/errors: client fault sink. Always succeeds; the payload only
/// lands in the logs.
async fn report_error(Json(payload): Json<serde_json::Value>) -> StatusCode {
    warn!(target = "gateway", report = %payload, "Client fault report");
    StatusCode::NO_CONTENT
}
