use std::sync::Arc;

use anyhow::{Context, Result};
use ddg2api::config::RelayConfig;
use ddg2api::server::build_router;
use ddg2api::util::{init_tracing, load_env, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let env_source = load_env();
    let config = RelayConfig::from_env().context("Failed to read configuration")?;
    init_tracing(config.debug_mode);
    tracing::info!("Environment loaded from: {}", env_source);

    if config.auth_enabled() {
        tracing::info!("API key gate enabled ({} keys)", config.api_keys.len());
    } else {
        tracing::info!("API key gate disabled (API_KEYS not set)");
    }
    if config.debug_mode {
        tracing::info!("Debug mode is enabled");
    }
    if config.backend_base_url != ddg2api::config::DEFAULT_BACKEND_URL {
        tracing::info!("Using backend at {}", config.backend_base_url);
    }

    let addr = config.bind_addr();
    let prefix = config.path_prefix.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(
        "DDG2API {} listening on http://{}{}/v1",
        env!("CARGO_PKG_VERSION"),
        addr,
        prefix
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
