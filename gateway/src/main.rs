use anwana_gateway::policy::CompletionPolicy;
use anwana_gateway::providers::{Backends, Provider};
use anwana_gateway::server::{serve, AppState, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anwana_gateway::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let provider = Provider::from_env();
    info!(target = "gateway", ?provider, "Starting gateway");

    let state = AppState {
        backends: Backends::for_provider(provider)?,
        policy: CompletionPolicy::default(),
    };
    serve(ServerConfig::default(), state).await
}
