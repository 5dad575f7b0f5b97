//! Agora Node - real-time messaging server.

use agora_node::api::{create_router, AppState};
use agora_node::config::Config;
use agora_node::observability::{init_logging, LogFormat};
use agora_realtime::HubHandle;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

/// Agora Node - real-time messaging for the Agora social network
#[derive(Parser, Debug)]
#[command(name = "agora-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "agora.yaml")]
    config: PathBuf,

    /// Listen address (overrides the config file)
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(Some(args.config.as_path()))?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    init_logging(&config.logging.level, LogFormat::parse(&config.logging.format));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Agora node");
    tracing::info!(
        addr = %config.server.addr,
        config = %args.config.display(),
        queue_capacity = config.client.queue_capacity,
        "Node configuration"
    );

    let state = AppState::in_memory(&config);
    tokio::spawn(log_presence(state.hub.clone()));

    let listener = tokio::net::TcpListener::bind(config.server.addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Agora node stopped");
    Ok(())
}

/// Log users coming online and going offline.
async fn log_presence(hub: HubHandle) {
    let mut changes = hub.subscribe_presence();
    loop {
        match changes.recv().await {
            Ok(change) => {
                tracing::debug!(user_id = change.user_id, status = %change.status, "Presence changed")
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Presence log lagged")
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
