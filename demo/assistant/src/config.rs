use std::fs;
use std::path::Path;
use std::time::Duration;

use anwana_core::audio::mic::MicConfig;
use anwana_core::audio::playback::PlaybackConfig;
use anwana_core::{HttpGatewayConfig, TurnConfig};

/// High-level configuration for the assistant demo
#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub mic: MicConfig,
    pub turn: TurnConfig,
    pub gateway: HttpGatewayConfig,
    pub playback: PlaybackConfig,
    /// End-to-end budget for one utterance through the pipeline
    pub pipeline_budget_ms: u64,
    /// Remote fault sink; defaults to the gateway's error route
    pub fault_report_url: Option<String>,
    /// Use the WebRTC classifier instead of the energy gate
    pub use_webrtc_vad: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        let gateway = HttpGatewayConfig::default();
        let fault_report_url = std::env::var("FAULT_REPORT_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| Some(format!("{}/api/errors", gateway.base_url.trim_end_matches('/'))));
        let pipeline_budget_ms = std::env::var("PIPELINE_BUDGET_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(20_000);
        let use_webrtc_vad = std::env::var("USE_WEBRTC_VAD")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);
        Self {
            mic: MicConfig::default(),
            turn: TurnConfig::default(),
            gateway,
            playback: PlaybackConfig::default(),
            pipeline_budget_ms,
            fault_report_url,
            use_webrtc_vad,
        }
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file (path via ASSISTANT_CONFIG or
    /// ./assistant.toml), overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("ASSISTANT_CONFIG").unwrap_or_else(|_| "assistant.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "assistant", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<AssistantToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target = "assistant", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "assistant", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    pub fn pipeline_budget(&self) -> Duration {
        Duration::from_millis(self.pipeline_budget_ms)
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct AssistantToml {
    pub gateway_base_url: Option<String>,
    pub pipeline_budget_ms: Option<u64>,
    pub fault_report_url: Option<String>,
    pub use_webrtc_vad: Option<bool>,
    pub mic: Option<MicToml>,
    pub turn: Option<TurnToml>,
    pub playback: Option<PlaybackToml>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct MicToml {
    pub sample_rate_hz: Option<u32>,
    pub frame_ms: Option<u32>,
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct TurnToml {
    pub threshold: Option<f32>,
    pub min_start_ms: Option<u32>,
    pub hangover_ms: Option<u32>,
    pub max_utterance_ms: Option<u32>,
    pub pre_roll_ms: Option<u32>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PlaybackToml {
    pub fade_ms: Option<u64>,
    pub volume_poll_ms: Option<u64>,
}

impl AssistantToml {
    fn overlay(self, mut base: AssistantConfig) -> AssistantConfig {
        if let Some(url) = self.gateway_base_url {
            base.gateway.base_url = url;
        }
        if let Some(ms) = self.pipeline_budget_ms {
            base.pipeline_budget_ms = ms;
        }
        if let Some(url) = self.fault_report_url {
            base.fault_report_url = Some(url);
        }
        if let Some(v) = self.use_webrtc_vad {
            base.use_webrtc_vad = v;
        }
        if let Some(m) = self.mic {
            if let Some(v) = m.sample_rate_hz {
                base.mic.sample_rate_hz = v;
                base.turn.sample_rate_hz = v;
            }
            if let Some(v) = m.frame_ms {
                base.mic.frame_ms = v;
                base.turn.frame_ms = v;
            }
            if m.device_name.is_some() {
                base.mic.device_name = m.device_name;
            }
        }
        if let Some(t) = self.turn {
            if let Some(v) = t.threshold {
                base.turn.threshold = v;
            }
            if let Some(v) = t.min_start_ms {
                base.turn.min_start_ms = v;
            }
            if let Some(v) = t.hangover_ms {
                base.turn.hangover_ms = v;
            }
            if let Some(v) = t.max_utterance_ms {
                base.turn.max_utterance_ms = v;
            }
            if let Some(v) = t.pre_roll_ms {
                base.turn.pre_roll_ms = v;
            }
        }
        if let Some(p) = self.playback {
            if let Some(v) = p.fade_ms {
                base.playback.fade = Duration::from_millis(v);
            }
            if let Some(v) = p.volume_poll_ms {
                base.playback.volume_interval = Duration::from_millis(v);
            }
        }
        base
    }
}
