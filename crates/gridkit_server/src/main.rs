use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gridkit_io_xlsx::RenderDispatcher;
use gridkit_server::{SpecServerConfig, build_router};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SpecServerConfig::parse();
    gridkit_log::init_logging(&config.log_level);
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let dispatcher = Arc::new(RenderDispatcher::new(config.derive_dispatch_options()));
    info!(
        pooled = dispatcher.is_pooled(),
        body_limit_bytes = config.body_limit_bytes,
        "Render dispatcher ready"
    );
    let app = build_router(dispatcher, config.body_limit_bytes);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
