//! Error types for the RPC layer.
//!
//! [`ServerError`] covers session resolution, sim actor failures, and
//! wraps the engine's [`SimError`]. It converts into an Axum response with
//! a JSON body of the form `{ "error": <message>, "status": <code> }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracon_sim::SimError;

/// Errors returned across the RPC boundary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The token does not belong to any signed-on controller.
    #[error("No Sim running for controller token")]
    NoSimForControllerToken,

    /// No session has the requested name.
    #[error("No Sim with that name")]
    NoNamedSim,

    /// A session with that name is already running.
    #[error("A Sim with that name already exists")]
    DuplicateSimName,

    /// The TRACON, scenario group, scenario, or split does not exist.
    #[error("Invalid Sim configuration")]
    InvalidSimConfiguration,

    /// The password did not match.
    #[error("Invalid password")]
    InvalidPassword,

    /// A job on the session's actor panicked. The session keeps running.
    #[error("Sim panicked: {0}")]
    SessionPanicked(String),

    /// The session's actor has shut down.
    #[error("Sim session has ended")]
    SessionClosed,

    /// The RPC method does not exist.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The request body did not match the method's arguments.
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    /// A domain, authorization, or syntax error from the sim.
    #[error(transparent)]
    Sim(#[from] SimError),
}

impl ServerError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NoSimForControllerToken => StatusCode::UNAUTHORIZED,
            Self::InvalidPassword => StatusCode::FORBIDDEN,
            Self::NoNamedSim | Self::UnknownMethod(_) => StatusCode::NOT_FOUND,
            Self::DuplicateSimName => StatusCode::CONFLICT,
            Self::InvalidSimConfiguration | Self::InvalidArguments(_) | Self::Sim(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::SessionPanicked(_) | Self::SessionClosed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
