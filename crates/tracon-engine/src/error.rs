//! Error types for the server binary.

/// Top-level error for the server binary.
///
/// Each variant wraps a subsystem error so `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: tracon_sim::ConfigError,
    },

    /// The RPC server failed to bind or stopped serving.
    #[error("server error: {source}")]
    Server {
        /// The underlying listener error.
        #[from]
        source: tracon_server::ListenError,
    },
}
