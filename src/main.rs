//! Merge Drop Server
//!
//! Binary entry point: logging, configuration, and the WebSocket server
//! with graceful shutdown on Ctrl-C.

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use merge_drop::{GameServer, ServerConfig, BROADCAST_RATE, TICK_RATE, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Merge Drop Server v{}", VERSION);
    info!("Default rates: {} Hz sim, {} Hz broadcast", TICK_RATE, BROADCAST_RATE);

    let config = ServerConfig::load_or_default();
    info!(
        "WebSocket on {}, health on {}, max {} connections",
        config.bind_addr(),
        config.health_addr(),
        config.max_connections
    );

    let server = GameServer::new(config);
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                let _ = shutdown.send(());
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await.context("game server failed")?;

    info!("Server stopped");
    Ok(())
}
