//! Session manager and RPC server for the TRACON training simulator.
//!
//! This crate provides:
//!
//! - **[`SimManager`]**, the registry of running sessions. It maps
//!   controller tokens to positions, drives each sim on a background task,
//!   and evicts silent controllers and idle sessions.
//! - **The sim actor** ([`session::SimHandle`]), which owns one sim and
//!   serializes every operation on it.
//! - **JSON RPC over HTTP** (`POST /rpc/{method}`), dispatched by
//!   [`dispatcher::dispatch`].
//! - **Minimal HTML status page** (`GET /`) and a liveness check
//!   (`GET /health`).
//!
//! # Architecture
//!
//! Handlers resolve the caller's token through the manager, then send a
//! job to the session's actor. Sessions run in parallel; within one
//! session, RPCs and ticks are applied one at a time in arrival order.

pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod router;
pub mod server;
pub mod session;
pub mod state;

// Re-export primary types for convenience.
pub use error::ServerError;
pub use manager::{NewSimRequest, NewSimResult, RemoteSim, SimConnectionRequest, SimManager};
pub use router::build_router;
pub use server::{ListenError, start_server};
pub use session::SimHandle;
pub use state::AppState;
