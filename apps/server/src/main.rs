//! Skywave Server - standalone station player backend.
//!
//! Hosts the playback session and its HTTP/WebSocket API as a background
//! daemon. The station UI connects over WebSocket, one page volunteers to
//! host the media element, and every client receives the same snapshot and
//! event feed.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use skywave_core::{bootstrap_services, start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// Skywave Server - headless radio station playback backend.
#[derive(Parser, Debug)]
#[command(name = "skywave-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SKYWAVE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "SKYWAVE_BIND_PORT")]
    port: Option<u16>,

    /// Live program stream URL (overrides config file).
    #[arg(long, env = "SKYWAVE_LIVE_URL")]
    live_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Skywave Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(url) = args.live_url {
        config.live_stream_url = Some(url);
    }

    log::info!(
        "Configuration: bind_port={}, live_stream={}, inventory={}, telemetry={}",
        config.bind_port,
        config.live_stream_url.as_deref().unwrap_or("(none)"),
        config
            .inventory_base_url
            .as_deref()
            .map(|_| "configured")
            .unwrap_or("(none)"),
        config
            .telemetry_endpoint
            .as_deref()
            .map(|_| "configured")
            .unwrap_or("(none)"),
    );

    // Bootstrap services
    let core_config = config.to_core_config();
    let services =
        bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    // Build app state for the HTTP server
    let app_state = AppState::builder()
        .session(services.session.clone())
        .player_state(Arc::clone(&services.player_state))
        .broadcast_tx(services.broadcast_tx.clone())
        .element_hub(Arc::clone(&services.element_hub))
        .ws_manager(Arc::clone(&services.ws_manager))
        .config(Arc::new(core_config))
        .build();

    // Spawn the HTTP server on the main tokio runtime
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP server started on port {}", config.bind_port);

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown
    services.shutdown().await;

    // Abort the server task (clients are already disconnected at this point)
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
