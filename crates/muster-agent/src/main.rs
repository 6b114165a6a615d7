//! muster Agent Daemon
//!
//! Connects out to the muster server, registers under a unique name, and
//! executes commands dispatched by the operator. Reconnects with
//! exponential backoff when the connection drops.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use muster_agent::{connection, ExponentialBackoff};
use muster_core::config::{self, AgentConfig};

#[derive(Parser)]
#[command(name = "muster-agent")]
#[command(about = "muster agent - connects to the server and executes commands")]
#[command(version)]
struct Args {
    /// Server URL (overrides config)
    #[arg(short, long)]
    server: Option<String>,

    /// Agent name (defaults to hostname)
    #[arg(short, long)]
    name: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("muster agent starting...");

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        AgentConfig::default()
    };
    if let Some(server) = args.server {
        config.server_url = server;
    }

    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    let name = args
        .name
        .or_else(|| (!config.name.is_empty()).then(|| config.name.clone()))
        .unwrap_or_else(|| hostname.clone());

    tracing::info!("Agent name: {} (server: {})", name, config.server_url);

    // Setup signal handler for graceful shutdown
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C, shutting down...");
        cancel_clone.cancel();
    });

    let mut backoff = ExponentialBackoff::from_config(&config.backoff);

    // Reconnect loop: an orderly close resets the backoff, errors advance it.
    while !cancel.is_cancelled() {
        match connection::run_connection(&config, &name, &hostname, &cancel).await {
            Ok(()) => {
                if cancel.is_cancelled() {
                    break;
                }
                backoff.reset();
            }
            Err(e) => {
                tracing::warn!("Connection failed: {}", e);
            }
        }

        let delay = backoff.next_delay();
        tracing::info!("Reconnecting in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => break,
        }
    }

    tracing::info!("Agent shutdown complete");
    Ok(())
}
