//! Controllers, restriction areas, launch configuration, and the
//! per-poll world update handed to clients.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::aircraft::Aircraft;
use crate::enums::LaunchMode;
use crate::events::Event;
use crate::geo::Point2LL;
use crate::ids::{Callsign, Tcp};

/// Maximum number of user-drawn restriction areas per sim.
pub const MAX_RESTRICTION_AREAS: usize = 100;

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// A control position as configured for a facility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Controller {
    /// Descriptive position name ("Kennedy Final").
    #[serde(default)]
    pub position: String,
    /// Name used on the radio ("New York Approach").
    #[serde(default)]
    pub radio_name: String,
    /// Frequency in kilohertz (e.g. 132400).
    #[serde(default)]
    pub frequency: u32,
    /// Facility identifier the position belongs to.
    #[serde(default)]
    pub facility: String,
    /// Instructor position.
    #[serde(default)]
    pub instructor: bool,
    /// Remote pilot operator position.
    #[serde(default)]
    pub rpo: bool,
}

impl Controller {
    /// Frequency formatted as `132.400`.
    pub fn frequency_string(&self) -> String {
        format!(
            "{}.{:03}",
            self.frequency.div_euclid(1000),
            self.frequency.rem_euclid(1000)
        )
    }
}

// ---------------------------------------------------------------------------
// Restriction areas
// ---------------------------------------------------------------------------

/// A controller-drawn restriction area shown on every scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RestrictionArea {
    /// Title shown with the area.
    #[serde(default)]
    pub title: String,
    /// Free text lines.
    #[serde(default)]
    pub text: Vec<String>,
    /// Polygon vertices; empty for a circle.
    #[serde(default)]
    pub vertices: Vec<Point2LL>,
    /// Circle center, when the area is a circle.
    #[serde(default)]
    pub circle_center: Option<Point2LL>,
    /// Circle radius, nm.
    #[serde(default)]
    pub radius: f32,
    /// Fill the area.
    #[serde(default)]
    pub shade_region: bool,
    /// Palette index.
    #[serde(default)]
    pub color: u8,
    /// Slot is free for reuse.
    #[serde(default)]
    pub deleted: bool,
}

// ---------------------------------------------------------------------------
// Launch configuration
// ---------------------------------------------------------------------------

/// Who launches traffic and at what rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LaunchConfig {
    /// Position holding launch control; `None` lets anyone claim it.
    #[serde(default)]
    pub controller: Option<Tcp>,
    /// Automatic or manual launches.
    #[serde(default)]
    pub mode: LaunchMode,
    /// Multiplier on every IFR departure rate.
    #[serde(default = "default_rate_scale")]
    pub departure_rate_scale: f32,
    /// Multiplier on every VFR departure rate.
    #[serde(default = "default_rate_scale")]
    pub vfr_departure_rate_scale: f32,
    /// Multiplier on every arrival and overflight rate.
    #[serde(default = "default_rate_scale")]
    pub inbound_flow_rate_scale: f32,
    /// Probability that an arrival is scripted to go around.
    #[serde(default = "default_go_around_rate")]
    pub go_around_rate: f32,
    /// Departures spawn held on the ground until released.
    #[serde(default)]
    pub hold_departures: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            controller: None,
            mode: LaunchMode::default(),
            departure_rate_scale: default_rate_scale(),
            vfr_departure_rate_scale: default_rate_scale(),
            inbound_flow_rate_scale: default_rate_scale(),
            go_around_rate: default_go_around_rate(),
            hold_departures: false,
        }
    }
}

const fn default_rate_scale() -> f32 {
    1.0
}

const fn default_go_around_rate() -> f32 {
    0.05
}

// ---------------------------------------------------------------------------
// World update
// ---------------------------------------------------------------------------

/// Everything a client needs to redraw after one poll.
///
/// Entities are a full snapshot; `events` holds only what was posted
/// since this controller's previous poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldUpdate {
    /// All aircraft.
    pub aircraft: BTreeMap<Callsign, Aircraft>,
    /// Active controllers, virtual and human.
    pub controllers: BTreeMap<Tcp, Controller>,
    /// Positions currently held by humans.
    pub human_controllers: Vec<Tcp>,
    /// Positions flagged as instructors.
    pub instructors: Vec<Tcp>,
    /// Simulated time.
    pub time: DateTime<Utc>,
    /// Launch configuration.
    pub launch_config: LaunchConfig,
    /// Restriction areas, including deleted slots so indices stay stable.
    pub user_restriction_areas: Vec<RestrictionArea>,
    /// Whether the sim is paused.
    pub sim_is_paused: bool,
    /// Sim rate multiplier.
    pub sim_rate: f32,
    /// IFR aircraft spawned so far.
    pub total_ifr: u32,
    /// VFR aircraft spawned so far.
    pub total_vfr: u32,
    /// Events since the previous poll.
    pub events: Vec<Event>,
}
