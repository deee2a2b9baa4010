//! Microphone capture using cpal.
//!
//! Linux build note: you need ALSA development headers for `cpal`.
//! On Debian/Ubuntu:
//!   sudo apt-get update && sudo apt-get install -y libasound2-dev pkg-config
//!
//! The cpal stream is `!Send`, so a producer thread owns it and forwards
//! fixed-size mono f32 frames over a channel. Device failures are forwarded
//! as [`CaptureEvent::Fault`] and end the stream; capture faults are fatal
//! for the session, so there is no reconnect loop here.

use crate::audio::CaptureEvent;
use crate::{Result, VoiceError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Configuration for microphone capture
#[derive(Clone, Debug)]
pub struct MicConfig {
    /// Desired sample rate; frames are resampled to this rate if the device
    /// cannot capture at it natively.
    pub sample_rate_hz: u32,
    /// Frame size in milliseconds for emitted capture frames
    pub frame_ms: u32,
    /// Optional input device name substring to match
    pub device_name: Option<String>,
}

impl Default for MicConfig {
    fn default() -> Self {
        let frame_ms = std::env::var("MIC_FRAME_MS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(20);
        let device_name = std::env::var("MIC_DEVICE").ok();
        Self {
            sample_rate_hz: 16_000,
            frame_ms,
            device_name,
        }
    }
}

/// Microphone source: owns the capture thread and hands out a frame receiver.
pub struct MicSource {
    config: MicConfig,
}

impl MicSource {
    pub fn new(config: MicConfig) -> Self {
        Self { config }
    }

    /// Start capture on a dedicated thread. Frames (and at most one trailing
    /// fault) arrive on the returned receiver; the thread exits when the
    /// receiver is dropped or the device fails.
    pub fn start(self) -> Result<mpsc::Receiver<CaptureEvent>> {
        let (tx, rx) = mpsc::channel::<CaptureEvent>(64);
        let cfg = self.config;
        std::thread::Builder::new()
            .name("anwana-mic".into())
            .spawn(move || run_capture(cfg, tx))
            .map_err(|e| VoiceError::Capture(format!("failed to spawn capture thread: {e}")))?;
        Ok(rx)
    }
}

fn run_capture(config: MicConfig, tx: mpsc::Sender<CaptureEvent>) {
    let host = cpal::default_host();

    let input_device = if let Some(ref needle) = config.device_name {
        let mut found: Option<cpal::Device> = None;
        match host.input_devices() {
            Ok(devices) => {
                for dev in devices {
                    if let Ok(name) = dev.name() {
                        if name.to_lowercase().contains(&needle.to_lowercase()) {
                            info!("Selected input device by MIC_DEVICE='{}': {}", needle, name);
                            found = Some(dev);
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!("Failed to list input devices: {}", e),
        }
        found.or_else(|| host.default_input_device())
    } else {
        host.default_input_device()
    };

    let input_device = match input_device {
        Some(d) => d,
        None => {
            fault(&tx, "no input device available".into());
            return;
        }
    };
    let device_name = input_device.name().unwrap_or_else(|_| "unknown".into());

    // Prefer a native config at the requested rate; otherwise take the
    // device default and resample.
    let chosen_config = match pick_input_config(&input_device, config.sample_rate_hz) {
        Ok(c) => c,
        Err(e) => {
            fault(&tx, format!("failed to resolve input config: {e}"));
            return;
        }
    };

    let device_rate = chosen_config.sample_rate().0;
    let device_channels = chosen_config.channels();
    info!(
        "Mic configured rate={}Hz channels={} device=\"{}\"",
        device_rate, device_channels, device_name
    );

    let frame_samples = (config.sample_rate_hz as u64 * config.frame_ms as u64 / 1000) as usize;
    let stream_config: cpal::StreamConfig = chosen_config.clone().into();

    let err_tx = tx.clone();
    let err_fn = move |err: cpal::StreamError| {
        error!("cpal input stream error: {}", err);
        fault(&err_tx, format!("input stream error: {err}"));
    };

    // Accumulator of mono samples at the target rate, drained frame by frame.
    let mut acc: Vec<f32> = Vec::with_capacity(frame_samples * 2);
    let data_tx = tx.clone();
    let target_rate = config.sample_rate_hz;

    let build = || -> Result<cpal::Stream> {
        match chosen_config.sample_format() {
            cpal::SampleFormat::F32 => build_input_stream::<f32, _, _>(
                &input_device,
                &stream_config,
                err_fn.clone(),
                move |data: &[f32]| {
                    let mono = downmix(data, device_channels);
                    let resampled = resample(&mono, device_rate, target_rate);
                    emit_frames(&resampled, &mut acc, frame_samples, |frame| {
                        let _ = data_tx.try_send(CaptureEvent::Frame(frame));
                    });
                },
            ),
            cpal::SampleFormat::I16 => build_input_stream::<i16, _, _>(
                &input_device,
                &stream_config,
                err_fn.clone(),
                move |data: &[i16]| {
                    let converted: Vec<f32> = data.iter().map(|&s| i16_to_f32(s)).collect();
                    let mono = downmix(&converted, device_channels);
                    let resampled = resample(&mono, device_rate, target_rate);
                    emit_frames(&resampled, &mut acc, frame_samples, |frame| {
                        let _ = data_tx.try_send(CaptureEvent::Frame(frame));
                    });
                },
            ),
            cpal::SampleFormat::U16 => build_input_stream::<u16, _, _>(
                &input_device,
                &stream_config,
                err_fn.clone(),
                move |data: &[u16]| {
                    let converted: Vec<f32> = data.iter().map(|&s| u16_to_f32(s)).collect();
                    let mono = downmix(&converted, device_channels);
                    let resampled = resample(&mono, device_rate, target_rate);
                    emit_frames(&resampled, &mut acc, frame_samples, |frame| {
                        let _ = data_tx.try_send(CaptureEvent::Frame(frame));
                    });
                },
            ),
            other => Err(VoiceError::Capture(format!(
                "unsupported sample format: {other:?}"
            ))),
        }
    };

    let stream = match build() {
        Ok(s) => s,
        Err(e) => {
            fault(&tx, format!("failed to build input stream: {e}"));
            return;
        }
    };

    if let Err(e) = stream.play() {
        fault(&tx, format!("failed to start input stream: {e}"));
        return;
    }

    info!(
        "MicSource started: device=\"{}\" frame={}ms rate={}Hz",
        device_name, config.frame_ms, target_rate
    );

    // Keep the stream alive until the consumer goes away.
    while !tx.is_closed() {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
}

fn fault(tx: &mpsc::Sender<CaptureEvent>, message: String) {
    let _ = tx.try_send(CaptureEvent::Fault(message));
}

/// Pick a supported input config at the requested rate, preferring f32 and
/// the lowest channel count, falling back to the device default.
fn pick_input_config(
    device: &cpal::Device,
    rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let configs = device
        .supported_input_configs()
        .map_err(|e| VoiceError::Capture(format!("failed to query input configs: {e}")))?;

    let mut best: Option<(usize, u16, cpal::SupportedStreamConfig)> = None;
    for range in configs {
        if range.min_sample_rate().0 > rate || range.max_sample_rate().0 < rate {
            continue;
        }
        let fmt_rank = match range.sample_format() {
            cpal::SampleFormat::F32 => 0usize,
            cpal::SampleFormat::I16 => 1,
            cpal::SampleFormat::U16 => 2,
            _ => 3,
        };
        let channels = range.channels();
        let cfg = range.with_sample_rate(cpal::SampleRate(rate));
        match &best {
            Some((r, ch, _)) if (*r, *ch) <= (fmt_rank, channels) => {}
            _ => best = Some((fmt_rank, channels, cfg)),
        }
    }

    if let Some((_, _, cfg)) = best {
        return Ok(cfg);
    }
    device
        .default_input_config()
        .map_err(|e| VoiceError::Capture(format!("failed to get default input config: {e}")))
}

fn build_input_stream<T, F, E>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    err_fn: E,
    mut on_data: F,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    F: FnMut(&[T]) + Send + 'static,
    E: Fn(cpal::StreamError) + Send + 'static,
{
    device
        .build_input_stream(config, move |data: &[T], _| on_data(data), err_fn, None)
        .map_err(|e| VoiceError::Capture(format!("failed to build input stream: {e}")))
}

/// Average interleaved channels down to mono.
fn downmix(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler. Good enough for speech-band capture.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

fn emit_frames<F: FnMut(Vec<f32>)>(
    data: &[f32],
    acc: &mut Vec<f32>,
    frame_samples: usize,
    mut emit: F,
) {
    acc.extend_from_slice(data);
    while acc.len() >= frame_samples {
        let frame: Vec<f32> = acc.drain(..frame_samples).collect();
        emit(frame);
    }
}

#[inline]
fn i16_to_f32(s: i16) -> f32 {
    s as f32 / i16::MAX as f32
}

#[inline]
fn u16_to_f32(s: u16) -> f32 {
    (s as f32 - 32_768.0) / 32_768.0
}
