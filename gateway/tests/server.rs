//! Gateway routes exercised through the router, no sockets involved.

use anwana_core::AudioMime;
use anwana_gateway::policy::CompletionPolicy;
use anwana_gateway::providers::{
    Backends, CompletionBackend, SttBackend, TtsAudio, TtsBackend,
};
use anwana_gateway::server::{router, AppState};
use anwana_gateway::{GatewayError, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "anwana-test-boundary";

#[derive(Default)]
struct StubCounters {
    stt_calls: AtomicUsize,
    completion_calls: AtomicUsize,
    tts_calls: AtomicUsize,
}

struct StubStt {
    counters: Arc<StubCounters>,
    transcript: String,
    fail: bool,
}

#[async_trait]
impl SttBackend for StubStt {
    async fn transcribe(&self, _audio: Vec<u8>, _mime: AudioMime) -> Result<String> {
        self.counters.stt_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GatewayError::Backend(
                "secret provider detail: key expired".into(),
            ));
        }
        Ok(self.transcript.clone())
    }
}

struct StubCompletion {
    counters: Arc<StubCounters>,
}

#[async_trait]
impl CompletionBackend for StubCompletion {
    async fn complete(&self, _system_prompt: &str, user_text: &str) -> Result<String> {
        self.counters.completion_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("you said: {user_text}"))
    }
}

struct StubTts {
    counters: Arc<StubCounters>,
}

#[async_trait]
impl TtsBackend for StubTts {
    async fn synthesize(&self, text: &str) -> Result<TtsAudio> {
        self.counters.tts_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TtsAudio {
            audio: text.as_bytes().to_vec(),
            content_type: "audio/mpeg".into(),
        })
    }
}

fn app(transcript: &str, fail_stt: bool) -> (axum::Router, Arc<StubCounters>) {
    let counters = Arc::new(StubCounters::default());
    let state = AppState {
        backends: Backends {
            stt: Arc::new(StubStt {
                counters: Arc::clone(&counters),
                transcript: transcript.to_string(),
                fail: fail_stt,
            }),
            completion: Arc::new(StubCompletion {
                counters: Arc::clone(&counters),
            }),
            tts: Arc::new(StubTts {
                counters: Arc::clone(&counters),
            }),
        },
        policy: CompletionPolicy {
            persona: "You are a test assistant.".into(),
            language: "English".into(),
            max_reply_words: 60,
            fallback_reply: "I didn't catch that, please come again.".into(),
        },
    };
    (router(state, 1024 * 1024), counters)
}

fn multipart_body(subtype: &str) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; \
             filename=\"utterance.{subtype}\"\r\nContent-Type: audio/{subtype}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&[0u8, 1, 2, 3, 4, 5, 6, 7]);
    body.extend_from_slice(
        format!(
            "\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"type\"\r\n\r\n{subtype}\
             \r\n--{BOUNDARY}--\r\n"
        )
        .as_bytes(),
    );
    (
        format!("multipart/form-data; boundary={BOUNDARY}"),
        body,
    )
}

fn json_request(uri: &str, text: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "text": text }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn speech_round_trip_frames_the_audio() {
    let (app, counters) = app("hello there", false);
    let (content_type, body) = multipart_body("webm");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/speech")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "audio/mpeg"
    );
    let expected = b"you said: hello there";
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH].to_str().unwrap(),
        expected.len().to_string()
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), expected);
    assert_eq!(counters.stt_calls.load(Ordering::SeqCst), 1);
    assert_eq!(counters.completion_calls.load(Ordering::SeqCst), 1);
    assert_eq!(counters.tts_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsupported_type_is_rejected_before_any_backend_call() {
    let (app, counters) = app("ignored", false);
    let (content_type, body) = multipart_body("flac");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/speech")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(counters.stt_calls.load(Ordering::SeqCst), 0);
    assert_eq!(counters.completion_calls.load(Ordering::SeqCst), 0);
    assert_eq!(counters.tts_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn backend_failure_does_not_leak_detail() {
    let (app, counters) = app("ignored", true);
    let (content_type, body) = multipart_body("wav");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/stt")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    assert!(!text.contains("key expired"));
    assert!(text.contains("upstream failure"));
    // The retry wrapper tried twice before giving up.
    assert_eq!(counters.stt_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stt_route_returns_the_transcript() {
    let (app, _) = app("turn on the lights", false);
    let (content_type, body) = multipart_body("mp4");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/stt")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["text"], "turn on the lights");
}

#[tokio::test]
async fn empty_transcript_gets_the_fallback_reply() {
    let (app, counters) = app("", false);

    let response = app
        .oneshot(json_request("/api/complete", "   "))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["text"], "I didn't catch that, please come again.");
    // The fallback never touches the completion backend.
    assert_eq!(counters.completion_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tts_rejects_empty_text() {
    let (app, counters) = app("", false);

    let response = app.oneshot(json_request("/api/tts", "")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(counters.tts_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn error_sink_always_accepts() {
    let (app, _) = app("", false);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/errors")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "message": "playback decode failed",
                        "source": "playback",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
