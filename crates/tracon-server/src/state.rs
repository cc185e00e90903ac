//! Shared application state for the RPC server.

use std::sync::Arc;

use crate::manager::SimManager;

/// Shared state for the Axum application, injected via the `State`
/// extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The session registry every handler works through.
    pub manager: Arc<SimManager>,
}

impl AppState {
    /// Wrap a manager for the router.
    pub const fn new(manager: Arc<SimManager>) -> Self {
        Self { manager }
    }
}
