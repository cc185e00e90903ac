//! Server binary for the TRACON training simulator.
//!
//! Wires the configuration, the session manager, and the RPC server
//! together and serves until the process is terminated.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `tracon-config.yaml` (or the path given as
//!    the first argument)
//! 3. Create the session manager
//! 4. Serve the RPC router

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracon_server::{AppState, SimManager};
use tracon_sim::ServerConfig;

use crate::error::EngineError;

/// Config file used when no path is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "tracon-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the config file is unreadable or the server cannot
/// bind its address.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("tracon-engine starting");

    // 2. Load configuration.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let tracon_count = config.tracons.len();
    let scenario_group_count: usize = config.tracons.values().map(|groups| groups.len()).sum();
    info!(
        host = config.server.host,
        port = config.server.port,
        local = config.server.local,
        tracon_count,
        scenario_group_count,
        "Configuration loaded"
    );

    // 3. Create the session manager.
    let http = config.server.clone();
    let manager = Arc::new(SimManager::new(config));
    let state = Arc::new(AppState::new(manager));

    // 4. Serve until terminated.
    tracon_server::start_server(&http, state)
        .await
        .map_err(EngineError::from)
        .with_context(|| format!("serving on {}:{}", http.host, http.port))?;

    info!("tracon-engine shutdown complete");
    Ok(())
}

/// Load the server configuration from `path`.
///
/// A missing file is not an error: the server starts with the defaults
/// and no scenarios.
fn load_config(path: &Path) -> Result<ServerConfig, EngineError> {
    if path.exists() {
        let config = ServerConfig::from_file(path)?;
        Ok(config)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(ServerConfig::default())
    }
}
