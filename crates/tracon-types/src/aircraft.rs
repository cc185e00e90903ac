//! Aircraft, flight plan, and navigation state.
//!
//! These are plain data. All behavior (clearances, track transfers, the
//! per-tick motion model) lives in `tracon-sim`, which mutates these
//! structs in place and hands clones to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{FlightRules, LeaderLineDirection, TransponderMode, TurnMethod};
use crate::geo::Point2LL;
use crate::ids::{Callsign, Tcp};

// ---------------------------------------------------------------------------
// Squawk
// ---------------------------------------------------------------------------

/// A four-digit octal transponder code.
///
/// Stored as its numeric value (`0o1200` for VFR); displayed and parsed as
/// four octal digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct Squawk(pub u16);

impl Squawk {
    /// The VFR code, 1200.
    pub const VFR: Self = Self(0o1200);

    /// Parse exactly four octal digits.
    pub fn parse(s: &str) -> Option<Self> {
        let num = |v: &str| v.parse::<u16>().ok().map(f32::from);
        if let Some(lo) = s.strip_suffix('+') {
            return Some(Self { range: [num(lo)?, 0.0] });
        }
        if let Some(hi) = s.strip_suffix('-') {
            return Some(Self { range: [0.0, num(hi)?] });
        }
        if let Some((lo, hi)) = s.split_once('-') {
            let (lo, hi) = (num(lo)?, num(hi)?);
            return Some(Self { range: [lo.min(hi), lo.max(hi)] });
        }
        num(s).map(Self::at)
    }

    /// Multiply both bounds, e.g. to convert hundreds of feet into feet.
    pub fn scaled(self, factor: f32) -> Self {
        Self { range: self.range.map(|v| v * factor) }
    }

    /// The altitude an aircraft currently at `alt` should fly to in order
    /// to satisfy the restriction with the least change.
    pub fn target_altitude(self, alt: f32) -> f32 {
        let [lo, hi] = self.range;
        if lo != 0.0 && alt < lo {
            lo
        } else if hi != 0.0 && alt > hi {
            hi
        } else {
            alt
        }
    }
}

// ---------------------------------------------------------------------------
// Waypoint
// ---------------------------------------------------------------------------

/// A route point plus the scripted actions that fire when it is passed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Waypoint {
    /// Fix name.
    pub fix: String,
    /// Position; resolved from the fix table when left at the origin.
    #[serde(default)]
    pub location: Point2LL,
    /// Altitude to be at when crossing.
    #[serde(default)]
    pub altitude_restriction: Option<AltitudeRestriction>,
    /// Speed to be at when crossing, knots.
    #[serde(default)]
    pub speed: Option<f32>,
    /// Fly this heading after passing.
    #[serde(default)]
    pub heading: Option<f32>,
    /// Hand the track from the virtual controller to the human position.
    #[serde(default)]
    pub human_handoff: bool,
    /// Hand the track to a specific position.
    #[serde(default)]
    pub tcp_handoff: Option<Tcp>,
    /// Switch the aircraft to the next controller's frequency.
    #[serde(default)]
    pub transfer_comms: bool,
    /// Set the primary scratchpad.
    #[serde(default)]
    pub primary_scratchpad: Option<String>,
    /// Clear the primary scratchpad.
    #[serde(default)]
    pub clear_primary_scratchpad: bool,
    /// Set the secondary scratchpad.
    #[serde(default)]
    pub secondary_scratchpad: Option<String>,
    /// Clear the secondary scratchpad.
    #[serde(default)]
    pub clear_secondary_scratchpad: bool,
    /// Point the aircraft out to this position.
    #[serde(default)]
    pub point_out: Option<Tcp>,
    /// Remove the aircraft from the sim.
    #[serde(default)]
    pub delete: bool,
    /// Runway threshold: land or go around.
    #[serde(default)]
    pub land: bool,
}

// ---------------------------------------------------------------------------
// Flight plan and performance
// ---------------------------------------------------------------------------

/// The filed flight plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FlightPlan {
    /// IFR or VFR.
    pub rules: FlightRules,
    /// ICAO aircraft type designator.
    pub aircraft_type: String,
    /// Departure airport ICAO code.
    pub departure_airport: String,
    /// Arrival airport ICAO code.
    pub arrival_airport: String,
    /// Filed cruise altitude in feet.
    pub altitude: i32,
    /// Route string as filed.
    pub route: String,
    /// Controller-issued discretionary identifier.
    pub cid: Option<String>,
}

/// Performance envelope for an aircraft type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Performance {
    /// Minimum clean speed, knots.
    #[serde(default = "default_min_speed")]
    pub min_speed: f32,
    /// Approach speed, knots.
    #[serde(default = "default_approach_speed")]
    pub approach_speed: f32,
    /// Maximum speed below 10,000 ft, knots.
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,
    /// Service ceiling, feet.
    #[serde(default = "default_ceiling")]
    pub ceiling: f32,
    /// Climb rate, feet per minute.
    #[serde(default = "default_climb_rate")]
    pub climb_rate: f32,
    /// Descent rate, feet per minute.
    #[serde(default = "default_descent_rate")]
    pub descent_rate: f32,
    /// Standard-rate turn, degrees per second.
    #[serde(default = "default_turn_rate")]
    pub turn_rate: f32,
    /// Speed change, knots per second.
    #[serde(default = "default_acceleration")]
    pub acceleration: f32,
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            min_speed: default_min_speed(),
            approach_speed: default_approach_speed(),
            max_speed: default_max_speed(),
            ceiling: default_ceiling(),
            climb_rate: default_climb_rate(),
            descent_rate: default_descent_rate(),
            turn_rate: default_turn_rate(),
            acceleration: default_acceleration(),
        }
    }
}

const fn default_min_speed() -> f32 {
    160.0
}

const fn default_approach_speed() -> f32 {
    140.0
}

const fn default_max_speed() -> f32 {
    250.0
}

const fn default_ceiling() -> f32 {
    41_000.0
}

const fn default_climb_rate() -> f32 {
    2_500.0
}

const fn default_descent_rate() -> f32 {
    2_000.0
}

const fn default_turn_rate() -> f32 {
    3.0
}

const fn default_acceleration() -> f32 {
    2.0
}

// ---------------------------------------------------------------------------
// Navigation state
// ---------------------------------------------------------------------------

/// A "cross fix at" clearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CrossFixRestriction {
    /// The fix to cross.
    pub fix: String,
    /// Altitude window at the fix, feet.
    pub altitude: Option<AltitudeRestriction>,
    /// Speed at the fix, knots.
    pub speed: Option<f32>,
}

/// What to do after passing a "depart fix" clearance point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum DepartFixAction {
    /// Proceed direct to another fix.
    Direct(String),
    /// Fly a heading.
    Heading(f32),
}

/// A pending "depart fix" clearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DepartFix {
    /// The fix to depart.
    pub fix: String,
    /// What to do after passing it.
    pub action: DepartFixAction,
}

/// Approach clearance state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ApproachState {
    /// Approach the pilot has been told to expect.
    pub expected: Option<String>,
    /// Whether the aircraft is cleared for the expected approach.
    pub cleared: bool,
    /// Cleared straight-in (no procedure turn).
    pub straight_in: bool,
    /// Intercepting the final approach course from a heading.
    pub intercepting: bool,
    /// "At fix, cleared approach": clearance applies once this fix is passed.
    pub at_fix_cleared: Option<String>,
}

/// Position, motion, and outstanding ATC assignments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NavState {
    /// Current position.
    pub position: Point2LL,
    /// Altitude, feet MSL.
    pub altitude: f32,
    /// True heading, degrees.
    pub heading: f32,
    /// Indicated airspeed, knots.
    pub speed: f32,
    /// Assigned altitude, feet.
    pub assigned_altitude: Option<f32>,
    /// Altitude to take once the assigned speed is reached.
    pub deferred_altitude: Option<f32>,
    /// Assigned heading, degrees; `None` means flying the route.
    pub assigned_heading: Option<f32>,
    /// Turn direction for the assigned heading.
    pub turn: TurnMethod,
    /// Assigned speed, knots.
    pub assigned_speed: Option<f32>,
    /// Speed to take once the assigned altitude is reached.
    pub deferred_speed: Option<f32>,
    /// Expedite the current climb or descent.
    pub expedite: bool,
    /// Remaining route.
    pub waypoints: Vec<Waypoint>,
    /// Climbing via the SID's published restrictions.
    pub climb_via_sid: bool,
    /// Descending via the STAR's published restrictions.
    pub descend_via_star: bool,
    /// Outstanding "cross fix at" clearance.
    pub cross_fix: Option<CrossFixRestriction>,
    /// Outstanding "depart fix" clearance.
    pub depart_fix: Option<DepartFix>,
    /// Approach clearance.
    pub approach: ApproachState,
}

// ---------------------------------------------------------------------------
// Aircraft
// ---------------------------------------------------------------------------

/// A handoff that a receiving controller redirected elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RedirectedHandoff {
    /// The position that redirected the offer.
    pub redirector: Tcp,
    /// The position the offer was redirected to.
    pub redirect_to: Tcp,
}

/// A simulated aircraft and its controller assignments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Aircraft {
    /// Callsign.
    pub callsign: Callsign,
    /// Transponder code.
    pub squawk: Squawk,
    /// Transponder mode.
    pub mode: TransponderMode,
    /// Squawking ident until this sim time.
    pub ident_until: Option<DateTime<Utc>>,
    /// Filed flight plan.
    pub flight_plan: FlightPlan,
    /// Performance envelope.
    pub performance: Performance,
    /// Position and ATC assignments.
    pub nav: NavState,

    /// Position with radar track ownership.
    pub tracking_controller: Option<Tcp>,
    /// Position the pilot is talking to.
    pub controlling_controller: Option<Tcp>,
    /// Position a handoff has been offered to.
    pub handoff_track_controller: Option<Tcp>,
    /// Redirect applied to the pending handoff.
    pub redirected_handoff: Option<RedirectedHandoff>,
    /// Positions that have been forced a quick-look datablock.
    pub force_ql_controllers: Vec<Tcp>,

    /// Primary scratchpad.
    pub scratchpad: String,
    /// Secondary scratchpad.
    pub secondary_scratchpad: String,
    /// Special-purpose code override shown in the datablock.
    pub spc_override: Option<String>,
    /// Leader line direction applied on every scope.
    pub global_leader_line: Option<LeaderLineDirection>,
    /// Temporary (interim) altitude entered by the controller, feet.
    pub temporary_altitude: Option<i32>,
    /// Pilot-reported altitude entered for non-mode-C targets, feet.
    pub pilot_reported_altitude: Option<i32>,

    /// Departure is held on the ground until released.
    pub hold_for_release: bool,
    /// Held departure has been released.
    pub released: bool,
    /// Generated but not yet launched by the launch controller.
    pub waiting_for_launch: bool,

    /// Position that scripted waypoint handoffs resolve against.
    pub waypoint_handoff_controller: Option<Tcp>,
    /// Altitude at which a departure checks in with departure control.
    pub departure_contact_altitude: Option<f32>,
    /// Position a departure checks in with.
    pub departure_contact_controller: Option<Tcp>,
    /// Position working the aircraft's approach.
    pub approach_controller: Option<Tcp>,
    /// Go around if the distance to the runway drops below this, nm.
    pub go_around_distance: Option<f32>,
}

impl Aircraft {
    /// Current position.
    pub const fn position(&self) -> Point2LL {
        self.nav.position
    }

    /// Current altitude in feet.
    pub const fn altitude(&self) -> f32 {
        self.nav.altitude
    }

    /// Whether `tcp` is tracking this aircraft.
    pub fn is_tracked_by(&self, tcp: &Tcp) -> bool {
        self.tracking_controller.as_ref() == Some(tcp)
    }

    /// Whether `tcp` is talking to this aircraft.
    pub fn is_controlled_by(&self, tcp: &Tcp) -> bool {
        self.controlling_controller.as_ref() == Some(tcp)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn squawk_parses_octal_only() {
        assert_eq!(Squawk::parse("1200"), Some(Squawk::VFR));
        assert_eq!(Squawk::parse("7777"), Some(Squawk(0o7777)));
        assert_eq!(Squawk::parse("1280"), None);
        assert_eq!(Squawk::parse("123"), None);
        assert_eq!(Squawk::VFR.to_string(), "1200");
    }

    #[test]
    fn altitude_restriction_forms() {
        assert_eq!(AltitudeRestriction::parse("40"), Some(AltitudeRestriction::at(40.0)));
        assert_eq!(
            AltitudeRestriction::parse("40+").map(|r| r.range),
            Some([40.0, 0.0])
        );
        assert_eq!(
            AltitudeRestriction::parse("80-").map(|r| r.range),
            Some([0.0, 80.0])
        );
        assert_eq!(
            AltitudeRestriction::parse("60-40").map(|r| r.range),
            Some([40.0, 60.0])
        );
        assert_eq!(AltitudeRestriction::parse("abc"), None);
    }

    #[test]
    fn target_altitude_moves_least() {
        let r = AltitudeRestriction { range: [4000.0, 6000.0] };
        assert!((r.target_altitude(3000.0) - 4000.0).abs() < f32::EPSILON);
        assert!((r.target_altitude(5000.0) - 5000.0).abs() < f32::EPSILON);
        assert!((r.target_altitude(9000.0) - 6000.0).abs() < f32::EPSILON);
    }

    #[test]
    fn ownership_helpers() {
        let ac = Aircraft {
            tracking_controller: Some(Tcp::from("2J")),
            controlling_controller: Some(Tcp::from("2K")),
            ..Aircraft::default()
        };
        assert!(ac.is_tracked_by(&Tcp::from("2J")));
        assert!(!ac.is_tracked_by(&Tcp::from("2K")));
        assert!(ac.is_controlled_by(&Tcp::from("2K")));
    }
}
