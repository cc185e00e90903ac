//! Simulation engine for the TRACON training simulator.
//!
//! One [`Sim`] per session. It is synchronous and single-threaded: the
//! server wraps each sim in an actor and every operation here runs on
//! that actor's task.
//!
//! # Modules
//!
//! - [`sim`] -- The session: roster, update loop, coordination timers
//! - [`track`] -- Track ownership, handoffs, point-outs, datablocks
//! - [`control`] -- Clearances and pilot readbacks
//! - [`command`] / [`interpret`] -- The controller command language
//! - [`spawn`] -- Traffic generation and deferred check-ins
//! - [`cid`] -- Controller-issued identifier allocation
//! - [`events`] -- Per-subscriber event buffering
//! - [`clock`] -- Wall-clock to sim-time conversion
//! - [`dynamics`] -- Aircraft motion
//! - [`state`] -- Serializable sim state
//! - [`config`] -- Server and facility configuration
//! - [`error`] -- Error types

pub mod aircraft;
pub mod cid;
pub mod clock;
pub mod command;
pub mod config;
pub mod control;
pub mod dynamics;
pub mod error;
pub mod events;
pub mod interpret;
pub mod sim;
pub mod spawn;
pub mod state;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;

pub use cid::CidAllocator;
pub use command::{Command, parse_command};
pub use config::{ServerConfig, SimulationSettings};
pub use control::HeadingArgs;
pub use error::{ConfigError, SimError};
pub use events::{EventStream, EventsSubscription};
pub use interpret::AircraftCommandsResult;
pub use sim::{Sim, SimSnapshot};
pub use state::{NewSimConfiguration, State};
