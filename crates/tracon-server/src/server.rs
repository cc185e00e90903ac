//! HTTP server lifecycle.
//!
//! Provides [`start_server`] which binds to a TCP port and serves the RPC
//! router until the process is terminated.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracon_sim::config::HttpConfig;

use crate::router::build_router;
use crate::state::AppState;

/// Start the HTTP server.
///
/// Binds to the configured address, builds the router, and serves
/// requests until the process is terminated.
///
/// # Errors
///
/// Returns an error if the address is invalid, the TCP listener cannot
/// bind, or the server hits a fatal I/O error.
pub async fn start_server(config: &HttpConfig, state: Arc<AppState>) -> Result<(), ListenError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ListenError::Bind(format!("invalid address: {e}")))?;

    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ListenError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, local = config.local, "TRACON server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| ListenError::Serve(format!("serve error: {e}")))?;

    Ok(())
}

/// Errors that can occur when starting or running the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}
