// =============================================================================
// TenderBid Engine — Main Entry Point
// =============================================================================
//
// Wires the decision record store, the workflow coordinator, and the
// backend service client together, then serves the REST API until
// Ctrl+C. The workflow is single-session and event-driven: all work
// happens in response to operator-triggered API calls.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod audit;
mod decision_record;
mod error;
mod runtime_config;
mod selector;
mod services;
mod types;
mod workflow;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;
use crate::services::client::HttpBackendClient;
use crate::workflow::WorkflowEngine;

const CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        TenderBid Engine — Starting Up                   ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Env overrides take precedence at startup.
    if let Ok(url) = std::env::var("TENDERBID_BACKEND_URL") {
        if !url.trim().is_empty() {
            config.backend_base_url = url;
        }
    }
    if let Ok(addr) = std::env::var("TENDERBID_BIND_ADDR") {
        if !addr.trim().is_empty() {
            config.bind_addr = addr;
        }
    }

    info!(
        backend = %config.backend_base_url,
        threshold = config.default_profit_threshold_pct,
        "Configured backend services"
    );

    // ── 2. Build shared state & engine ───────────────────────────────────
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config));

    let client = Arc::new(HttpBackendClient::new(
        state.runtime_config.read().backend_base_url.clone(),
    ));
    let engine = Arc::new(WorkflowEngine::new(
        state.clone(),
        client.clone(),
        client.clone(),
        client.clone(),
        client,
    ));

    // ── 3. Serve the API ─────────────────────────────────────────────────
    let app = api::rest::router(engine);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {bind_addr}: {e}"))?;
    info!(addr = %bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    warn!("Shutdown signal received — stopping gracefully");
    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("TenderBid Engine shut down complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
