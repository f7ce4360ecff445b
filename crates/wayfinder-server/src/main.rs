//! # wayfinder-server
//!
//! HTTP server for the wayfinder indoor positioning engine.
//!
//! This binary provides:
//! - REST API for content, scanning, positioning and routing
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package wayfinder-server
//!
//! # Production, scanning the local adapter
//! WAYFINDER_ENV=production ./wayfinder-server
//! ```
//!
//! ## Environment
//!
//! - `WAYFINDER_BIND` - listen address, default `0.0.0.0:3000`
//! - `WAYFINDER_CONFIG` - configuration file, default per platform
//! - `WAYFINDER_ENV` - `production` for JSON file logging
//! - `WAYFINDER_LOG_LEVEL` - base log level when `RUST_LOG` is unset
//! - `WAYFINDER_SCAN_LOG_LEVEL` - level of the per-cycle scan worker logs
//! - `WAYFINDER_LOG_DIR` - directory of production log files

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use wayfinder_core::EngineConfig;
use wayfinder_server::state::AppState;
use wayfinder_server::{api, logging};

const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_settings = logging::LogSettings::from_env()?;
    logging::init(&log_settings)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting wayfinder-server");

    let addr: SocketAddr = std::env::var("WAYFINDER_BIND")
        .unwrap_or_else(|_| DEFAULT_BIND.to_string())
        .parse()
        .context("WAYFINDER_BIND is not a socket address")?;

    let config_path = match std::env::var_os("WAYFINDER_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => EngineConfig::default_path()?,
    };
    let config = EngineConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    info!(path = %config_path.display(), "Configuration loaded");

    let state = build_state(config, config_path)?;
    let app = api::create_router(state.clone());

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = state.engine().stop_scan().await {
        warn!(error = %e, "Scan worker did not stop cleanly");
    }
    info!("Server stopped");

    Ok(())
}

#[cfg(feature = "bluetooth")]
fn build_state(config: EngineConfig, config_path: PathBuf) -> anyhow::Result<AppState> {
    Ok(AppState::with_bluez(config, Some(config_path))?)
}

#[cfg(not(feature = "bluetooth"))]
fn build_state(config: EngineConfig, config_path: PathBuf) -> anyhow::Result<AppState> {
    Ok(AppState::new(config, Some(config_path))?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
