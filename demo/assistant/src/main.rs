mod config;

use anwana_core::audio::mic::MicSource;
use anwana_core::audio::playback::PlaybackEngine;
use anwana_core::turn::{EnergyClassifier, SpeechClassifier, WebRtcClassifier};
use anwana_core::{
    HttpGateway, PipelineOrchestrator, SessionEvent, TurnController, VoiceSession,
    VoiceSessionConfig,
};
use config::AssistantConfig;
use tokio::signal;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,anwana_core=info,assistant=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        target = "assistant",
        "Starting assistant demo: Mic → Turn taking → Gateway → Playback"
    );

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = AssistantConfig::load();

    // 1) Mic capture on a dedicated thread
    let frames = MicSource::new(cfg.mic.clone()).start()?;

    // 2) Turn controller with the configured classifier
    let classifier: Box<dyn SpeechClassifier> = if cfg.use_webrtc_vad {
        Box::new(WebRtcClassifier::new(cfg.turn.sample_rate_hz, 2)?)
    } else {
        Box::new(EnergyClassifier::default())
    };
    let controller = TurnController::new(cfg.turn.clone(), classifier);

    // 3) Pipeline against the HTTP gateway
    let gateway = HttpGateway::new(cfg.gateway.clone())?;
    let (orchestrator, pipeline_events) =
        PipelineOrchestrator::new(gateway, cfg.pipeline_budget());

    // 4) Playback engine on its own audio thread
    let (playback_tx, playback_rx) = tokio::sync::mpsc::unbounded_channel();
    let player = PlaybackEngine::spawn(cfg.playback.clone(), playback_tx)?;

    // 5) Session wiring
    let session_cfg = VoiceSessionConfig {
        fault_report_url: cfg.fault_report_url.clone(),
    };
    let (session, mut events) = VoiceSession::new(
        session_cfg,
        controller,
        orchestrator,
        pipeline_events,
        player,
        playback_rx,
    );

    // Surface session events in the logs
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::StateChanged(state) => {
                    info!(target = "assistant", ?state, "State")
                }
                SessionEvent::Volume(v) => debug!(target = "assistant", volume = v, "Level"),
                SessionEvent::Fault { source, message } => {
                    error!(target = "assistant", source, message, "Fault")
                }
            }
        }
    });

    tokio::select! {
        outcome = session.run(frames) => {
            if let Err(e) = outcome {
                error!(target = "assistant", error = %e, "Session ended with error");
                return Err(e.into());
            }
        }
        _ = signal::ctrl_c() => {
            info!(target = "assistant", "Shutting down");
        }
    }

    Ok(())
}
