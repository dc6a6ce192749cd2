//! Standalone relay server binary.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use chorus_core::adapters::tcp::server::{RelayServer, RELAY_PORT};

/// Wait for a termination signal: Ctrl+C everywhere, plus SIGTERM on Unix so
/// service managers (`docker stop`, systemd) also get a graceful shutdown.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("// ─────────────────────────────────────────");
    println!("// chorus relay server — uncompressed voice conferencing");
    println!("//   format: PCM, 2 ch, 48000 Hz, 16-bit");
    println!("// ─────────────────────────────────────────");

    let addr: std::net::SocketAddr = format!("0.0.0.0:{RELAY_PORT}").parse()?;
    let server = Arc::new(RelayServer::bind(addr).await?);
    println!("listening on {RELAY_PORT}");

    let shutdown = Arc::clone(&server);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        shutdown.request_shutdown();
    });

    server.run().await
}
