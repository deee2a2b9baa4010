//! Playback engine: renders synthesized replies via `rodio`.
//!
//! `rodio::OutputStream` is `!Send` on some platforms, so the engine confines
//! it to a dedicated OS thread and proxies operations through a command
//! channel; the public [`PlaybackEngine`] handle is `Send` and implements
//! [`ReplyPlayer`].
//!
//! Interruption is a fade, not a cut: an abrupt stop produces an audible
//! click, so `interrupt` ramps the sink gain exponentially to near-silence
//! over a short fixed duration before releasing the sink. A new `play`
//! arriving mid-fade gets its own fresh sink; fading sinks drain and release
//! independently.

use crate::audio::player::{PlaybackEvent, PlaybackHandle, ReplyPlayer};
use crate::audio::volume::compute_volume;
use crate::pipeline::SynthesizedReply;
use crate::{Result, VoiceError};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Gain considered inaudible; the fade releases the sink once it gets here.
const SILENCE_FLOOR: f32 = 0.01;

#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Total duration of the interrupt fade.
    pub fade: Duration,
    /// Interval between gain steps during the fade.
    pub fade_interval: Duration,
    /// Cadence of live volume feedback events.
    pub volume_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        let fade_ms = std::env::var("PLAYBACK_FADE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1_000);
        let volume_ms = std::env::var("PLAYBACK_VOLUME_POLL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        Self {
            fade: Duration::from_millis(fade_ms),
            fade_interval: Duration::from_millis(80),
            volume_interval: Duration::from_millis(volume_ms),
        }
    }
}

/// Gain schedule for the interrupt fade: an exponential ramp from full gain
/// down to [`SILENCE_FLOOR`], one entry per `interval` tick.
fn fade_gains(duration: Duration, interval: Duration) -> Vec<f32> {
    let steps = (duration.as_millis() / interval.as_millis().max(1)).max(1) as u32;
    let decay = SILENCE_FLOOR.powf(1.0 / steps as f32);
    (1..=steps).map(|i| decay.powi(i as i32)).collect()
}

enum PlaybackCommand {
    Play {
        reply: SynthesizedReply,
        done: mpsc::Sender<Result<PlaybackHandle>>,
    },
    Interrupt {
        handle: PlaybackHandle,
    },
    Shutdown,
}

/// `Send` handle to the dedicated playback thread.
pub struct PlaybackEngine {
    cmd_tx: mpsc::Sender<PlaybackCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Open the default output device on a dedicated thread. Events (volume
    /// feedback, playback end, playback faults) arrive on the given sender.
    pub fn spawn(
        cfg: PlaybackConfig,
        events: tokio::sync::mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<PlaybackCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<()>>();

        let thread = thread::Builder::new()
            .name("anwana-playback".into())
            .spawn(move || run_playback(cfg, cmd_rx, init_tx, events))
            .map_err(|e| VoiceError::Playback(format!("failed to spawn playback thread: {e}")))?;

        init_rx
            .recv()
            .map_err(|_| VoiceError::Playback("playback thread died during init".into()))??;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }
}

impl ReplyPlayer for PlaybackEngine {
    fn play(&mut self, reply: SynthesizedReply) -> Result<PlaybackHandle> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(PlaybackCommand::Play { reply, done: tx })
            .map_err(|_| VoiceError::Playback("playback thread died".into()))?;
        rx.recv()
            .map_err(|_| VoiceError::Playback("playback thread died".into()))?
    }

    fn interrupt(&mut self, handle: PlaybackHandle) {
        let _ = self.cmd_tx.send(PlaybackCommand::Interrupt { handle });
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(PlaybackCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// One live playback instance on the audio thread.
struct ActivePlayback {
    sink: Arc<Sink>,
    /// True until the instance ends naturally or an interrupt claims it.
    playing: Arc<AtomicBool>,
}

fn run_playback(
    cfg: PlaybackConfig,
    cmd_rx: mpsc::Receiver<PlaybackCommand>,
    init_tx: mpsc::Sender<Result<()>>,
    events: tokio::sync::mpsc::UnboundedSender<PlaybackEvent>,
) {
    // Output stream must live (and die) on this thread.
    let (_stream, stream_handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = init_tx.send(Err(VoiceError::Playback(format!(
                "failed to open output device: {e}"
            ))));
            return;
        }
    };
    if init_tx.send(Ok(())).is_err() {
        return;
    }

    let mut next_id: u64 = 0;
    let mut active: HashMap<PlaybackHandle, ActivePlayback> = HashMap::new();

    while let Ok(cmd) = cmd_rx.recv() {
        // Drop entries whose fade or natural completion already finished.
        active.retain(|_, a| a.playing.load(Ordering::SeqCst));

        match cmd {
            PlaybackCommand::Play { reply, done } => {
                // One active reply at a time: supersede anything still
                // audible with a fade of its own.
                let stale: Vec<PlaybackHandle> = active.keys().copied().collect();
                for h in stale {
                    if let Some(a) = active.remove(&h) {
                        start_fade(&cfg, a, &events, h, false);
                    }
                }

                next_id += 1;
                let handle = PlaybackHandle(next_id);
                match start_playback(&cfg, &stream_handle, reply, handle, &events) {
                    Ok(entry) => {
                        active.insert(handle, entry);
                        let _ = done.send(Ok(handle));
                    }
                    Err(e) => {
                        let _ = done.send(Err(e));
                    }
                }
            }
            PlaybackCommand::Interrupt { handle } => {
                if let Some(a) = active.remove(&handle) {
                    start_fade(&cfg, a, &events, handle, true);
                } else {
                    debug!(target = "playback", ?handle, "interrupt for inactive handle ignored");
                }
            }
            PlaybackCommand::Shutdown => break,
        }
    }

    // Remaining sinks stop when the stream drops with this thread.
    for (_, a) in active.drain() {
        a.playing.store(false, Ordering::SeqCst);
        a.sink.stop();
    }
}

fn start_playback(
    cfg: &PlaybackConfig,
    stream_handle: &OutputStreamHandle,
    reply: SynthesizedReply,
    handle: PlaybackHandle,
    events: &tokio::sync::mpsc::UnboundedSender<PlaybackEvent>,
) -> Result<ActivePlayback> {
    let decoder = rodio::Decoder::new(Cursor::new(reply.audio))
        .map_err(|e| VoiceError::Playback(format!("failed to decode reply audio: {e}")))?;

    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples().collect();
    if samples.is_empty() {
        return Err(VoiceError::Playback("decoded reply is empty".into()));
    }

    let sink = Sink::try_new(stream_handle)
        .map_err(|e| VoiceError::Playback(format!("failed to open sink: {e}")))?;
    sink.append(rodio::buffer::SamplesBuffer::new(
        channels,
        sample_rate,
        samples.clone(),
    ));

    let sink = Arc::new(sink);
    let playing = Arc::new(AtomicBool::new(true));

    debug!(
        target = "playback",
        ?handle,
        samples = samples.len(),
        sample_rate,
        channels,
        "Playback started"
    );

    // Volume feedback: sample the window at the playhead on a fixed cadence.
    {
        let playing = Arc::clone(&playing);
        let events = events.clone();
        let interval = cfg.volume_interval;
        let frames_per_sec = sample_rate as f64 * channels as f64;
        thread::spawn(move || {
            let started = Instant::now();
            let window_len = (frames_per_sec * interval.as_secs_f64()) as usize;
            while playing.load(Ordering::SeqCst) {
                thread::sleep(interval);
                let pos = (started.elapsed().as_secs_f64() * frames_per_sec) as usize;
                if pos >= samples.len() {
                    break;
                }
                let end = (pos + window_len.max(1)).min(samples.len());
                let _ = events.send(PlaybackEvent::Volume(compute_volume(&samples[pos..end])));
            }
        });
    }

    // Completion watcher: emits Ended only if nothing else claimed the
    // instance first (fade or supersession).
    {
        let sink = Arc::clone(&sink);
        let playing = Arc::clone(&playing);
        let events = events.clone();
        thread::spawn(move || {
            sink.sleep_until_end();
            if playing.swap(false, Ordering::SeqCst) {
                debug!(target = "playback", ?handle, "Playback finished naturally");
                let _ = events.send(PlaybackEvent::Ended(handle));
            }
        });
    }

    Ok(ActivePlayback { sink, playing })
}

/// Ramp the sink gain to near-silence, then stop and release it. Runs on its
/// own thread so overlapping fades never contend.
fn start_fade(
    cfg: &PlaybackConfig,
    entry: ActivePlayback,
    events: &tokio::sync::mpsc::UnboundedSender<PlaybackEvent>,
    handle: PlaybackHandle,
    notify_end: bool,
) {
    let gains = fade_gains(cfg.fade, cfg.fade_interval);
    let interval = cfg.fade_interval;
    let events = events.clone();
    debug!(target = "playback", ?handle, steps = gains.len(), "Fading out");
    thread::spawn(move || {
        for gain in gains {
            if !entry.playing.load(Ordering::SeqCst) {
                // Drained naturally mid-fade; the watcher already reported.
                return;
            }
            thread::sleep(interval);
            entry.sink.set_volume(gain);
        }
        if entry.playing.swap(false, Ordering::SeqCst) {
            entry.sink.stop();
            if notify_end {
                let _ = events.send(PlaybackEvent::Ended(handle));
            }
        }
    });
}
