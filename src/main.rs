mod config;
mod error;
mod gemini;
mod models;
mod orchestrator;
mod registry;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use routes::{router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    config::{Config, IN_MEMORY_STORE},
    gemini::GeminiClient,
    orchestrator::{BatchEvent, Orchestrator},
    store::{FileStore, KeyValueStore, MemoryStore, Persistence},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    if config.fallback_api_key.is_empty() {
        tracing::info!("No GEMINI_API_KEY set; requests use the key stored in the session");
    } else {
        let key = &config.fallback_api_key;
        tracing::info!("Using fallback API key: {}...", key.chars().take(6).collect::<String>());
    }

    let store: Arc<dyn KeyValueStore> = if config.store_path.as_os_str() == IN_MEMORY_STORE {
        tracing::warn!("Using in-memory store; the session is lost on exit");
        Arc::new(MemoryStore::default())
    } else {
        let store = FileStore::open(&config.store_path)
            .with_context(|| format!("opening store {}", config.store_path.display()))?;
        Arc::new(store)
    };
    let persistence = Persistence::new(store);
    let session = persistence.restore().context("restoring session")?;

    let gemini = Arc::new(GeminiClient::new(&config));
    let orchestrator = Arc::new(Orchestrator::new(session, gemini, persistence, config.fallback_api_key.clone()));
    tokio::spawn(log_events(orchestrator.subscribe()));
    let state = AppState { orchestrator };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<BatchEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::info!(event = %serde_json::to_string(&event).unwrap_or_default(), "batch event"),
            Err(RecvError::Lagged(skipped)) => tracing::warn!("Event log skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
