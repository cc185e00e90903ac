//! Shared type definitions for the TRACON training simulator.
//!
//! This crate is the single source of truth for every type that crosses
//! the RPC boundary. Types flow downstream to `TypeScript` via `ts-rs` for
//! scope clients.
//!
//! # Modules
//!
//! - [`ids`] -- Callsign, position, and session identifiers
//! - [`geo`] -- Positions and terminal-area distance math
//! - [`enums`] -- Event kinds, transponder modes, turn directions
//! - [`aircraft`] -- Aircraft, flight plan, waypoint, navigation state
//! - [`events`] -- Event stream payloads and radio transmissions
//! - [`structs`] -- Controllers, restriction areas, launch config, world update

pub mod aircraft;
pub mod enums;
pub mod events;
pub mod geo;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use aircraft::{
    Aircraft, AltitudeRestriction, ApproachState, CrossFixRestriction, DepartFix,
    DepartFixAction, FlightPlan, NavState, Performance, RedirectedHandoff, Squawk, Waypoint,
};
pub use enums::{
    EventType, FlightRules, LaunchMode, LeaderLineDirection, RadioTransmissionType,
    TransponderMode, TurnMethod,
};
pub use events::{Event, RadioTransmission};
pub use geo::Point2LL;
pub use ids::{Callsign, SessionId, Tcp};
pub use structs::{
    Controller, LaunchConfig, MAX_RESTRICTION_AREAS, RestrictionArea, WorldUpdate,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes bindings for types with #[ts(export)] when
        // export_all is called; files land in `bindings/` relative to
        // the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::SessionId::export_all();
        let _ = crate::ids::Callsign::export_all();
        let _ = crate::ids::Tcp::export_all();

        // Geometry
        let _ = crate::geo::Point2LL::export_all();

        // Enums
        let _ = crate::enums::EventType::export_all();
        let _ = crate::enums::RadioTransmissionType::export_all();
        let _ = crate::enums::FlightRules::export_all();
        let _ = crate::enums::TransponderMode::export_all();
        let _ = crate::enums::TurnMethod::export_all();
        let _ = crate::enums::LeaderLineDirection::export_all();
        let _ = crate::enums::LaunchMode::export_all();

        // Aircraft
        let _ = crate::aircraft::Squawk::export_all();
        let _ = crate::aircraft::AltitudeRestriction::export_all();
        let _ = crate::aircraft::Waypoint::export_all();
        let _ = crate::aircraft::FlightPlan::export_all();
        let _ = crate::aircraft::Performance::export_all();
        let _ = crate::aircraft::CrossFixRestriction::export_all();
        let _ = crate::aircraft::DepartFixAction::export_all();
        let _ = crate::aircraft::DepartFix::export_all();
        let _ = crate::aircraft::ApproachState::export_all();
        let _ = crate::aircraft::NavState::export_all();
        let _ = crate::aircraft::RedirectedHandoff::export_all();
        let _ = crate::aircraft::Aircraft::export_all();

        // Events
        let _ = crate::events::Event::export_all();
        let _ = crate::events::RadioTransmission::export_all();

        // Structs
        let _ = crate::structs::Controller::export_all();
        let _ = crate::structs::RestrictionArea::export_all();
        let _ = crate::structs::LaunchConfig::export_all();
        let _ = crate::structs::WorldUpdate::export_all();
    }
}
