mod config;
mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use verdict_common::config::EngineConfig;
use verdict_engine::Engine;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Verdict API booting...");

    let server_config = ServerConfig::from_env();
    let engine_config = EngineConfig::load_or_default(&server_config.config_path)
        .context("Failed to load engine configuration")?;

    info!(
        config_path = %server_config.config_path.display(),
        timeout_ms = engine_config.timeout_ms,
        max_heap_mb = engine_config.max_heap_mb,
        max_concurrent = engine_config.max_concurrent,
        key_order = ?engine_config.key_order,
        "Engine configured"
    );

    let state = Arc::new(AppState {
        engine: Engine::new(engine_config),
    });

    // Build router
    let app = Router::new()
        .merge(routes::routes())
        .with_state(state);

    // Start server
    let listener = TcpListener::bind(&server_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_config.bind_addr))?;

    info!("HTTP server listening on {}", server_config.bind_addr);
    info!("Ready to accept submissions");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// `LOG_FORMAT=json` switches to one JSON object per event.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
