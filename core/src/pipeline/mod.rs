// Utterance processing: gateway client and the cancellable stage pipeline

pub mod client;
pub mod orchestrator;

pub use client::{HttpGateway, HttpGatewayConfig, SpeechGateway, SynthesizedReply};
pub use orchestrator::{PipelineEvent, PipelineHandle, PipelineOrchestrator};
