//! upgrade-bridge server entry point.
//!
//! Serves the demonstration router with WebSocket upgrades routed through
//! the dispatcher.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use upgrade_bridge::api;
use upgrade_bridge::config::BridgeConfig;
use upgrade_bridge::server::Bridge;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = BridgeConfig::from_env().context("loading configuration")?;
    tracing::info!(addr = %config.listen_addr, "starting upgrade-bridge");

    let router = api::build_router(&config);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown signal received");
    };

    Bridge::new(router, config).serve(listener, shutdown).await?;

    Ok(())
}
