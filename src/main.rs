use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use agent_coordinator::api::{self, AppState};
use agent_coordinator::config::{ClientStoreBackend, ConfigManager, FileConfigManager};
use agent_coordinator::context::{ClientStore, InMemoryClientStore, JsonFileClientStore};
use agent_coordinator::invoker::SimulatedAgentInvoker;
use agent_coordinator::CoordinationEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_manager = FileConfigManager::from_env();
    let config = config_manager.load_config().await?;

    tracing::info!("Starting agent coordinator with {} agents", config.agents.len());

    let store: Arc<dyn ClientStore> = match config.client_store.backend {
        ClientStoreBackend::Memory => {
            tracing::warn!("Using in-memory client store, no client context will be available");
            Arc::new(InMemoryClientStore::new())
        }
        ClientStoreBackend::JsonFiles => Arc::new(JsonFileClientStore::new(&config.client_store)),
    };

    let engine = Arc::new(CoordinationEngine::from_config(
        &config,
        store,
        Arc::new(SimulatedAgentInvoker::new()),
    ));

    api::start_api_server(AppState::new(engine, &config.server), &config.server).await?;

    tracing::info!("Agent coordinator stopped.");
    Ok(())
}
