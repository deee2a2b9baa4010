//! End-to-end voice session.
//!
//! Owns the single process-wide turn state and wires capture frames, the
//! turn controller, the reply pipeline and the playback engine together.
//! The orchestrator and player sit behind traits, so the whole session runs
//! under test with a mock gateway and a counting fake player.
//!
//! Fault policy: a capture fault ends the session. Pipeline and playback
//! faults are reported and absorbed; the session returns to a
//! listening-ready state.

use crate::audio::CaptureEvent;
use crate::audio::player::{PlaybackEvent, PlaybackHandle, ReplyPlayer};
use crate::pipeline::{PipelineEvent, PipelineHandle, PipelineOrchestrator, SpeechGateway};
use crate::report::{FaultReport, FaultReporter};
use crate::turn::{SpeechClassifier, TurnController, TurnEvent};
use crate::{Result, VoiceError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where the session is in the conversational turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    /// Waiting for the user to speak.
    Idle,
    /// The user is speaking.
    Listening,
    /// An utterance just closed and is about to enter the pipeline.
    UtteranceCaptured,
    /// The pipeline is producing a reply.
    AwaitingResponse,
    /// The reply is playing.
    Playing,
}

/// Observable session output, suitable for driving a UI.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    StateChanged(TurnState),
    /// Live loudness, from the mic while listening and from the reply while
    /// playing.
    Volume(f32),
    /// A recoverable fault was absorbed.
    Fault { source: String, message: String },
}

#[derive(Clone, Debug, Default)]
pub struct VoiceSessionConfig {
    /// Endpoint for remote fault reporting; `None` keeps reports local.
    pub fault_report_url: Option<String>,
}

pub struct VoiceSession<C, G, P> {
    controller: TurnController<C>,
    orchestrator: PipelineOrchestrator<G>,
    pipeline_events: mpsc::UnboundedReceiver<PipelineEvent>,
    player: P,
    playback_events: mpsc::UnboundedReceiver<PlaybackEvent>,
    reporter: FaultReporter,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: TurnState,
    /// Pipeline run we are waiting on, if any.
    awaiting: Option<PipelineHandle>,
    /// Reply currently playing, if any.
    playing: Option<PlaybackHandle>,
}

impl<C, G, P> VoiceSession<C, G, P>
where
    C: SpeechClassifier,
    G: SpeechGateway + 'static,
    P: ReplyPlayer,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: VoiceSessionConfig,
        controller: TurnController<C>,
        orchestrator: PipelineOrchestrator<G>,
        pipeline_events: mpsc::UnboundedReceiver<PipelineEvent>,
        player: P,
        playback_events: mpsc::UnboundedReceiver<PlaybackEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                controller,
                orchestrator,
                pipeline_events,
                player,
                playback_events,
                reporter: FaultReporter::new(config.fault_report_url),
                events: tx,
                state: TurnState::Idle,
                awaiting: None,
                playing: None,
            },
            rx,
        )
    }

    /// Drive the session until capture fails or the frame source closes.
    pub async fn run(mut self, mut frames: mpsc::Receiver<CaptureEvent>) -> Result<()> {
        info!(target = "session", "Voice session started");
        loop {
            tokio::select! {
                capture = frames.recv() => match capture {
                    Some(CaptureEvent::Frame(frame)) => self.on_frame(&frame),
                    Some(CaptureEvent::Fault(message)) => {
                        // Capture faults are fatal: without a mic there is
                        // no session to return to.
                        return Err(VoiceError::Capture(message));
                    }
                    None => {
                        info!(target = "session", "Capture source closed, session over");
                        return Ok(());
                    }
                },
                Some(event) = self.pipeline_events.recv() => self.on_pipeline_event(event),
                Some(event) = self.playback_events.recv() => self.on_playback_event(event),
            }
        }
    }

    fn on_frame(&mut self, frame: &[f32]) {
        let turn_events = match self.controller.push_frame(frame) {
            Ok(events) => events,
            Err(e) => {
                self.absorb_fault("classifier", e.to_string());
                return;
            }
        };

        for event in turn_events {
            match event {
                TurnEvent::FrameProcessed { volume } => {
                    // While a reply plays, the playback engine owns volume
                    // feedback; mic volume would fight it.
                    if self.state != TurnState::Playing {
                        let _ = self.events.send(SessionEvent::Volume(volume));
                    }
                }
                TurnEvent::SpeechStart => self.on_speech_start(),
                TurnEvent::SpeechEnd { utterance } => {
                    self.set_state(TurnState::UtteranceCaptured);
                    let handle = self.orchestrator.submit(utterance);
                    self.awaiting = Some(handle);
                    self.set_state(TurnState::AwaitingResponse);
                }
            }
        }
    }

    /// Barge-in: supersede whatever the assistant was doing before the new
    /// utterance accumulates. Cancel first, then fade, then listen.
    fn on_speech_start(&mut self) {
        self.orchestrator.cancel_active();
        self.awaiting = None;
        if let Some(handle) = self.playing.take() {
            debug!(target = "session", ?handle, "Barge-in, interrupting playback");
            self.player.interrupt(handle);
        }
        self.set_state(TurnState::Listening);
    }

    fn on_pipeline_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Completed { handle, reply } => {
                if self.awaiting != Some(handle) {
                    debug!(target = "session", ?handle, "Ignoring superseded reply");
                    return;
                }
                self.awaiting = None;
                match self.player.play(reply) {
                    Ok(playback) => {
                        self.playing = Some(playback);
                        self.set_state(TurnState::Playing);
                    }
                    Err(e) => {
                        self.absorb_fault("playback", e.to_string());
                        self.set_state(TurnState::Idle);
                    }
                }
            }
            PipelineEvent::Failed { handle, cause } => {
                if self.awaiting != Some(handle) {
                    return;
                }
                self.awaiting = None;
                self.absorb_fault("pipeline", cause);
                self.set_state(TurnState::Idle);
            }
        }
    }

    fn on_playback_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Volume(volume) => {
                if self.state == TurnState::Playing {
                    let _ = self.events.send(SessionEvent::Volume(volume));
                }
            }
            PlaybackEvent::Ended(handle) => {
                if self.playing == Some(handle) {
                    self.playing = None;
                    self.set_state(TurnState::Idle);
                }
            }
            PlaybackEvent::Failed(handle, message) => {
                self.absorb_fault("playback", message);
                if self.playing == Some(handle) {
                    self.playing = None;
                    self.set_state(TurnState::Idle);
                }
            }
        }
    }

    fn set_state(&mut self, state: TurnState) {
        if self.state != state {
            debug!(target = "session", from = ?self.state, to = ?state, "State change");
            self.state = state;
            let _ = self.events.send(SessionEvent::StateChanged(state));
        }
    }

    fn absorb_fault(&mut self, source: &str, message: String) {
        warn!(target = "session", source, message = %message, "Recoverable fault");
        self.reporter
            .report(FaultReport::new(source, message.clone()));
        let _ = self.events.send(SessionEvent::Fault {
            source: source.to_string(),
            message,
        });
    }
}
