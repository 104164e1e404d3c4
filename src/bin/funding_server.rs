use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use funding_monitor::clock::SystemClock;
use funding_monitor::server::{router, ServerState};
use funding_monitor::source::bybit::BybitSource;
use funding_monitor::FundingConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = FundingConfig::from_env();
    let client = config.http_client().context("building HTTP client")?;
    let source = BybitSource::new(client, &config, Arc::new(SystemClock));
    let app = router(ServerState::new(source, &config.default_notional));

    let listener = tokio::net::TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("binding {}", config.server_addr))?;
    tracing::info!("funding server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
