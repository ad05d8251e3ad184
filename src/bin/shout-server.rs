//! Relay server binary
//!
//! Configured through `SHOUT_BIND_ADDR`, `SHOUT_MAX_CONNECTIONS` and
//! `SHOUT_SWEEP_INTERVAL`; log level through `RUST_LOG`.

use shout_rs::{RelayServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        addr = %config.bind_addr,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        max_connections = config.max_connections,
        "Starting relay server"
    );

    let server = RelayServer::new(config);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = server.run_until(shutdown).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
