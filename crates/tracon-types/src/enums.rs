//! Enumeration types shared between the engine and its clients.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The kind of state-change notification carried by an [`Event`].
///
/// [`Event`]: crate::events::Event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum EventType {
    /// A controller offered a handoff.
    OfferedHandoff,
    /// A handoff was accepted (by a human or automatically).
    AcceptedHandoff,
    /// A redirected handoff was accepted.
    AcceptedRedirectedHandoff,
    /// A handoff offer was withdrawn.
    CanceledHandoff,
    /// A pending handoff was redirected to another position.
    RedirectedHandoff,
    /// A controller pointed out an aircraft.
    PointOut,
    /// A point-out was acknowledged.
    AcknowledgedPointOut,
    /// A point-out was rejected by its recipient.
    RejectedPointOut,
    /// A point-out was withdrawn by its originator.
    RecalledPointOut,
    /// A controller started tracking an aircraft.
    InitiatedTrack,
    /// A controller stopped tracking an aircraft.
    DroppedTrack,
    /// A controller forced a quick-look datablock on another scope.
    ForceQL,
    /// The global leader line direction changed.
    SetGlobalLeaderLine,
    /// An aircraft squawked ident.
    Ident,
    /// A pilot transmission on frequency.
    RadioTransmission,
    /// A system status line (sign-on, sign-off, connection warnings).
    StatusMessage,
    /// A controller-to-controller message visible to every position.
    GlobalMessage,
    /// An operator broadcast delivered to every session on the server.
    ServerBroadcastMessage,
}

/// The kind of radio transmission a pilot makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum RadioTransmissionType {
    /// Initial check-in on a new frequency.
    Contact,
    /// Readback of a clearance.
    Readback,
    /// Unsolicited report (say-again answers, unable).
    Unexpected,
}

// ---------------------------------------------------------------------------
// Aircraft
// ---------------------------------------------------------------------------

/// Flight rules filed for a flight plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum FlightRules {
    /// Instrument flight rules.
    #[default]
    Ifr,
    /// Visual flight rules.
    Vfr,
}

/// Transponder operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum TransponderMode {
    /// Standby: no replies.
    Standby,
    /// Mode A: code only.
    On,
    /// Mode C: code and altitude.
    #[default]
    Altitude,
}

/// Direction to use when turning to an assigned heading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum TurnMethod {
    /// Take the shortest turn.
    #[default]
    Closest,
    /// Turn left.
    Left,
    /// Turn right.
    Right,
}

/// Direction of a datablock leader line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum LeaderLineDirection {
    /// North.
    North,
    /// Northeast.
    NorthEast,
    /// East.
    East,
    /// Southeast.
    SouthEast,
    /// South.
    South,
    /// Southwest.
    SouthWest,
    /// West.
    West,
    /// Northwest.
    NorthWest,
}

// ---------------------------------------------------------------------------
// Launch control
// ---------------------------------------------------------------------------

/// How new traffic enters the sim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum LaunchMode {
    /// The sim spawns traffic from configured rates.
    #[default]
    Automatic,
    /// The launch controller creates and launches each aircraft.
    Manual,
}
