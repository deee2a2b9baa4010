//! Cancellable reply pipeline.
//!
//! Every submitted utterance bumps a shared generation counter; the counter
//! value is the utterance's handle. Cancellation bumps the counter again, so
//! an in-flight task discovers it is stale at the next stage boundary and
//! exits without emitting anything. A result that lands after supersession
//! is discarded silently, which makes last-speech-wins cheap to enforce.

use crate::pipeline::client::{SpeechGateway, SynthesizedReply};
use crate::utterance::AudioUtterance;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Identifies one submitted utterance. Larger is newer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineHandle(pub u64);

#[derive(Clone, Debug)]
pub enum PipelineEvent {
    /// The pipeline finished and the result is still current.
    Completed {
        handle: PipelineHandle,
        reply: SynthesizedReply,
    },
    /// A current-generation run failed. Stale failures are never reported.
    Failed {
        handle: PipelineHandle,
        cause: String,
    },
}

pub struct PipelineOrchestrator<G> {
    gateway: Arc<G>,
    /// Latest issued generation; anything below it is stale.
    generation: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    /// End-to-end budget for one utterance across all three stages.
    budget: Duration,
}

impl<G: SpeechGateway + 'static> PipelineOrchestrator<G> {
    pub fn new(gateway: G, budget: Duration) -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                gateway: Arc::new(gateway),
                generation: Arc::new(AtomicU64::new(0)),
                events: tx,
                budget,
            },
            rx,
        )
    }

    /// Submit an utterance, superseding any in-flight run.
    pub fn submit(&self, utterance: AudioUtterance) -> PipelineHandle {
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = PipelineHandle(gen);
        debug!(target = "pipeline", ?handle, duration_ms = utterance.duration_ms(), "Submitted");

        let gateway = Arc::clone(&self.gateway);
        let generation = Arc::clone(&self.generation);
        let events = self.events.clone();
        let budget = self.budget;

        tokio::spawn(async move {
            let current = || generation.load(Ordering::SeqCst) == gen;

            let outcome = tokio::time::timeout(
                budget,
                run_stages(gateway.as_ref(), &utterance, &current),
            )
            .await;

            // Re-check after every await point: a result for a superseded
            // utterance must never surface.
            if !current() {
                debug!(target = "pipeline", ?handle, "Discarding stale result");
                return;
            }

            let event = match outcome {
                Ok(Ok(Some(reply))) => PipelineEvent::Completed { handle, reply },
                Ok(Ok(None)) => {
                    debug!(target = "pipeline", ?handle, "Superseded mid-stage");
                    return;
                }
                Ok(Err(e)) => {
                    warn!(target = "pipeline", ?handle, error = %e, "Pipeline failed");
                    PipelineEvent::Failed {
                        handle,
                        cause: e.to_string(),
                    }
                }
                Err(_) => {
                    warn!(target = "pipeline", ?handle, budget_ms = budget.as_millis() as u64, "Pipeline timed out");
                    PipelineEvent::Failed {
                        handle,
                        cause: format!("timed out after {}ms", budget.as_millis()),
                    }
                }
            };
            let _ = events.send(event);
        });

        handle
    }

    /// Invalidate the in-flight run, if any. The superseded task notices at
    /// its next stage boundary and exits quietly.
    pub fn cancel_active(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runs the three stages, bailing with `None` as soon as the run is stale.
async fn run_stages<G: SpeechGateway>(
    gateway: &G,
    utterance: &AudioUtterance,
    current: &impl Fn() -> bool,
) -> crate::Result<Option<SynthesizedReply>> {
    let transcript = gateway.transcribe(utterance).await?;
    if !current() {
        return Ok(None);
    }

    // An empty transcript still flows through: the completion stage owns the
    // fallback reply, so the user always hears something.
    let reply_text = gateway.complete(&transcript).await?;
    if !current() {
        return Ok(None);
    }

    let reply = gateway.synthesize(&reply_text).await?;
    Ok(Some(reply))
}
