//! Pipeline orchestrator behavior: supersession, cancellation, timeouts.

use anwana_core::{
    AudioMime, AudioUtterance, PipelineEvent, PipelineOrchestrator, Result, SpeechGateway,
    SynthesizedReply, VoiceError,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn utterance() -> AudioUtterance {
    AudioUtterance::new(vec![0.1; 1600], 16_000, AudioMime::Wav)
}

fn reply_for(text: &str) -> SynthesizedReply {
    let audio = text.as_bytes().to_vec();
    SynthesizedReply {
        content_length: audio.len(),
        content_type: "audio/mpeg".into(),
        audio,
    }
}

/// Gateway that labels each transcription with its call number and sleeps a
/// configurable amount per stage.
struct ScriptedGateway {
    stage_delay: Duration,
    stt_calls: AtomicUsize,
    completions: Mutex<Vec<String>>,
    fail_stt: bool,
}

impl ScriptedGateway {
    fn new(stage_delay: Duration) -> Self {
        Self {
            stage_delay,
            stt_calls: AtomicUsize::new(0),
            completions: Mutex::new(Vec::new()),
            fail_stt: false,
        }
    }

    fn failing(stage_delay: Duration) -> Self {
        Self {
            fail_stt: true,
            ..Self::new(stage_delay)
        }
    }
}

#[async_trait]
impl SpeechGateway for ScriptedGateway {
    async fn transcribe(&self, _utterance: &AudioUtterance) -> Result<String> {
        sleep(self.stage_delay).await;
        if self.fail_stt {
            return Err(VoiceError::Pipeline("stt backend unavailable".into()));
        }
        let n = self.stt_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("transcript {n}"))
    }

    async fn complete(&self, transcript: &str) -> Result<String> {
        sleep(self.stage_delay).await;
        self.completions.lock().unwrap().push(transcript.to_string());
        if transcript.is_empty() {
            Ok("I didn't catch that, please come again.".to_string())
        } else {
            Ok(format!("reply to {transcript}"))
        }
    }

    async fn synthesize(&self, reply: &str) -> Result<SynthesizedReply> {
        sleep(self.stage_delay).await;
        Ok(reply_for(reply))
    }
}

#[tokio::test]
async fn completes_a_single_utterance() {
    let (orchestrator, mut events) = PipelineOrchestrator::new(
        ScriptedGateway::new(Duration::from_millis(5)),
        Duration::from_secs(2),
    );
    let handle = orchestrator.submit(utterance());

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("pipeline should finish")
        .expect("channel open");
    match event {
        PipelineEvent::Completed { handle: got, reply } => {
            assert_eq!(got, handle);
            assert_eq!(reply.audio, b"reply to transcript 1");
            assert_eq!(reply.content_length, reply.audio.len());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn newer_submission_supersedes_older() {
    let (orchestrator, mut events) = PipelineOrchestrator::new(
        ScriptedGateway::new(Duration::from_millis(40)),
        Duration::from_secs(2),
    );
    let first = orchestrator.submit(utterance());
    sleep(Duration::from_millis(10)).await;
    let second = orchestrator.submit(utterance());
    assert!(second > first);

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("pipeline should finish")
        .expect("channel open");
    match event {
        PipelineEvent::Completed { handle, .. } => assert_eq!(handle, second),
        other => panic!("unexpected event: {other:?}"),
    }

    // The superseded run must stay silent.
    assert!(
        timeout(Duration::from_millis(300), events.recv())
            .await
            .is_err(),
        "stale run leaked an event"
    );
}

#[tokio::test]
async fn cancel_active_suppresses_the_result() {
    let (orchestrator, mut events) = PipelineOrchestrator::new(
        ScriptedGateway::new(Duration::from_millis(30)),
        Duration::from_secs(2),
    );
    orchestrator.submit(utterance());
    sleep(Duration::from_millis(5)).await;
    orchestrator.cancel_active();

    assert!(
        timeout(Duration::from_millis(300), events.recv())
            .await
            .is_err(),
        "cancelled run leaked an event"
    );
}

#[tokio::test]
async fn stage_failure_is_reported_for_the_current_run() {
    let (orchestrator, mut events) = PipelineOrchestrator::new(
        ScriptedGateway::failing(Duration::from_millis(5)),
        Duration::from_secs(2),
    );
    let handle = orchestrator.submit(utterance());

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("failure should surface")
        .expect("channel open");
    match event {
        PipelineEvent::Failed { handle: got, cause } => {
            assert_eq!(got, handle);
            assert!(cause.contains("stt backend unavailable"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn budget_overrun_fails_the_run() {
    let (orchestrator, mut events) = PipelineOrchestrator::new(
        ScriptedGateway::new(Duration::from_millis(200)),
        Duration::from_millis(50),
    );
    let handle = orchestrator.submit(utterance());

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timeout should surface")
        .expect("channel open");
    match event {
        PipelineEvent::Failed { handle: got, cause } => {
            assert_eq!(got, handle);
            assert!(cause.contains("timed out"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn empty_transcript_still_produces_a_reply() {
    struct SilentGateway(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl SpeechGateway for SilentGateway {
        async fn transcribe(&self, _utterance: &AudioUtterance) -> Result<String> {
            Ok(String::new())
        }
        async fn complete(&self, transcript: &str) -> Result<String> {
            self.0.lock().unwrap().push(transcript.to_string());
            Ok("I didn't catch that, please come again.".to_string())
        }
        async fn synthesize(&self, reply: &str) -> Result<SynthesizedReply> {
            Ok(reply_for(reply))
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (orchestrator, mut events) =
        PipelineOrchestrator::new(SilentGateway(Arc::clone(&seen)), Duration::from_secs(2));
    orchestrator.submit(utterance());

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("pipeline should finish")
        .expect("channel open");
    match event {
        PipelineEvent::Completed { reply, .. } => {
            assert!(!reply.audio.is_empty());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    // The empty transcript reached the completion stage unchanged.
    assert_eq!(seen.lock().unwrap().as_slice(), [String::new()]);
}
