// Anwana Gateway Library
// Stateless HTTP surface over pluggable STT, completion and TTS backends

pub mod policy;
pub mod providers;
pub mod server;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed request: missing parts, bad JSON.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The declared audio type is not one we accept.
    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// An upstream provider failed. The detail stays in the logs.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GatewayError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            GatewayError::UnsupportedMedia(m) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("unsupported audio type: {m}"),
            ),
            // Provider detail stays in the logs, never in the response.
            GatewayError::Backend(_)
            | GatewayError::Http(_)
            | GatewayError::Io(_)
            | GatewayError::Serialization(_) => {
                error!(target = "gateway", error = %self, "Upstream failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream failure".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
