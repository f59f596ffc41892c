// Wedding Registry - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use wedding_registry::{build_router, AppState, Config, Store};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let store = Store::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;

    let app = build_router(AppState::new(store.clone()), &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    tracing::info!(
        addr = %config.bind_addr,
        cors_any_origin = config.allows_any_origin(),
        "wedding registry API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Router (and its state clones) is gone once serve returns
    store.close().context("Failed to close database")?;
    tracing::info!("server stopped");

    Ok(())
}
