//! Configuration loading and typed config structures for the TRACON server.
//!
//! The canonical configuration lives in `tracon-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads and validates the file.
//!
//! Facility data is nested the way a client picks a session: TRACON, then
//! scenario group, then scenario. A scenario group carries everything shared
//! by its scenarios (airports, fixes, control positions, inbound flows); a
//! scenario picks the staffing and the active runways.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracon_types::{
    AltitudeRestriction, Controller, FlightRules, LaunchConfig, Performance, Point2LL, Tcp,
    Waypoint,
};

pub use crate::error::ConfigError;

/// Top-level server configuration.
///
/// Mirrors the structure of `tracon-config.yaml`. All fields have sensible
/// defaults so an empty file yields a runnable (if empty) server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: HttpConfig,

    /// Session driver and engine tuning.
    #[serde(default)]
    pub simulation: SimulationSettings,

    /// Password required for operator broadcasts; empty disables them.
    #[serde(default)]
    pub broadcast_password: String,

    /// TRACON name -> scenario group name -> group.
    #[serde(default)]
    pub tracons: BTreeMap<String, BTreeMap<String, ScenarioGroup>>,
}

impl ServerConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Server and engine settings
// ---------------------------------------------------------------------------

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Single-user local server: no idle eviction, solo-controller
    /// scenarios.
    #[serde(default)]
    pub local: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            local: false,
        }
    }
}

/// Session driver and simulation tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationSettings {
    /// Real-time milliseconds between driver updates.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seconds without an update before a session counts as idle.
    #[serde(default = "default_idle_limit_secs")]
    pub idle_limit_secs: u64,

    /// Idle sessions tolerated before idle ones start exiting.
    #[serde(default = "default_max_idle_sims")]
    pub max_idle_sims: usize,

    /// Seconds of silence before a "connection lost?" warning.
    #[serde(default = "default_idle_warn_secs")]
    pub idle_warn_secs: u64,

    /// Seconds of silence before a controller is signed off.
    #[serde(default = "default_idle_sign_off_secs")]
    pub idle_sign_off_secs: u64,

    /// Simulated seconds run before the first controller engages.
    #[serde(default = "default_prespawn_seconds")]
    pub prespawn_seconds: u32,

    /// Minimum simulated seconds before a virtual controller accepts a
    /// handoff or acknowledges a point-out.
    #[serde(default = "default_auto_accept_secs")]
    pub auto_accept_secs: i64,

    /// Random extra seconds (exclusive upper bound) added to the accept
    /// delay.
    #[serde(default = "default_auto_accept_jitter_secs")]
    pub auto_accept_jitter_secs: i64,

    /// RNG seed; unset draws from the OS.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Buffered events per stream before a backlog warning.
    #[serde(default = "default_event_backlog_warning")]
    pub event_backlog_warning: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            idle_limit_secs: default_idle_limit_secs(),
            max_idle_sims: default_max_idle_sims(),
            idle_warn_secs: default_idle_warn_secs(),
            idle_sign_off_secs: default_idle_sign_off_secs(),
            prespawn_seconds: default_prespawn_seconds(),
            auto_accept_secs: default_auto_accept_secs(),
            auto_accept_jitter_secs: default_auto_accept_jitter_secs(),
            seed: None,
            event_backlog_warning: default_event_backlog_warning(),
        }
    }
}

// ---------------------------------------------------------------------------
// Facility data
// ---------------------------------------------------------------------------

/// Everything shared by the scenarios of one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioGroup {
    /// Airports by ICAO code.
    #[serde(default)]
    pub airports: BTreeMap<String, Airport>,

    /// Named fixes.
    #[serde(default)]
    pub fixes: BTreeMap<String, Point2LL>,

    /// Every control position in the facility, virtual or staffable.
    #[serde(default)]
    pub control_positions: BTreeMap<Tcp, Controller>,

    /// Performance by aircraft type; unknown types use the defaults.
    #[serde(default)]
    pub aircraft_performance: BTreeMap<String, Performance>,

    /// Arrival and overflight streams by flow name.
    #[serde(default)]
    pub inbound_flows: BTreeMap<String, InboundFlow>,

    /// Scope center; aircraft far from it are culled.
    #[serde(default)]
    pub center: Point2LL,

    /// Airport used for weather and the default scope range.
    #[serde(default)]
    pub primary_airport: String,

    /// Scenarios by name.
    #[serde(default)]
    pub scenarios: BTreeMap<String, Scenario>,
}

/// An airport with its procedures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    /// Spoken name ("Kennedy").
    #[serde(default)]
    pub name: String,

    /// Reference point.
    #[serde(default)]
    pub location: Point2LL,

    /// Field elevation, feet.
    #[serde(default)]
    pub elevation: f32,

    /// Position departures check in with.
    #[serde(default)]
    pub departure_controller: Option<Tcp>,

    /// Position arrivals are sent to by "contact tower".
    #[serde(default)]
    pub tower_controller: Option<Tcp>,

    /// Approaches by identifier (`I22L`).
    #[serde(default)]
    pub approaches: BTreeMap<String, Approach>,

    /// Departure routes by runway.
    #[serde(default)]
    pub departure_routes: BTreeMap<String, Vec<DepartureRoute>>,
}

/// An instrument approach.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Approach {
    /// Spoken name ("ILS runway 22 left").
    #[serde(default)]
    pub full_name: String,

    /// Runway served.
    #[serde(default)]
    pub runway: String,

    /// Fixes from the initial fix to the threshold; the last one lands.
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

/// A departure procedure from one runway to one exit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepartureRoute {
    /// Exit fix.
    #[serde(default)]
    pub exit: String,

    /// Destinations served through this exit.
    #[serde(default)]
    pub destinations: Vec<String>,

    /// Route string filed on the flight plan.
    #[serde(default)]
    pub route: String,

    /// Initial route waypoints.
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,

    /// Initial assigned altitude, feet.
    #[serde(default = "default_departure_altitude")]
    pub initial_altitude: f32,

    /// Filed cruise altitude, feet.
    #[serde(default = "default_cruise_altitude")]
    pub cruise_altitude: i32,

    /// Altitude at which the departure checks in, feet.
    #[serde(default = "default_contact_altitude")]
    pub contact_altitude: f32,

    /// Airline ICAO codes flying this route.
    #[serde(default = "default_airlines")]
    pub airlines: Vec<String>,

    /// Aircraft types flying this route.
    #[serde(default = "default_aircraft_types")]
    pub aircraft_types: Vec<String>,
}

/// A stream of arriving and overflying traffic entering at one boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundFlow {
    /// Arrival procedures.
    #[serde(default)]
    pub arrivals: Vec<Arrival>,

    /// Overflight procedures.
    #[serde(default)]
    pub overflights: Vec<Overflight>,

    /// Arrivals per hour.
    #[serde(default)]
    pub arrival_rate: f32,

    /// Overflights per hour.
    #[serde(default)]
    pub overflight_rate: f32,
}

/// An arrival procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    /// Destination airport.
    #[serde(default)]
    pub airport: String,

    /// Route from the spawn point inbound.
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,

    /// Spawn altitude, feet.
    #[serde(default = "default_inbound_altitude")]
    pub initial_altitude: f32,

    /// Spawn speed, knots.
    #[serde(default = "default_inbound_speed")]
    pub initial_speed: f32,

    /// Altitude the arrival is descending to, feet.
    #[serde(default)]
    pub assigned_altitude: Option<f32>,

    /// Virtual position that owns the track at spawn.
    #[serde(default)]
    pub initial_controller: Option<Tcp>,

    /// Approach to expect, if the procedure assigns one.
    #[serde(default)]
    pub expect_approach: Option<String>,

    /// Airline ICAO codes flying this arrival.
    #[serde(default = "default_airlines")]
    pub airlines: Vec<String>,

    /// Aircraft types flying this arrival.
    #[serde(default = "default_aircraft_types")]
    pub aircraft_types: Vec<String>,
}

/// An overflight procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overflight {
    /// Route through the airspace.
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,

    /// Spawn altitude, feet.
    #[serde(default = "default_inbound_altitude")]
    pub initial_altitude: f32,

    /// Spawn speed, knots.
    #[serde(default = "default_inbound_speed")]
    pub initial_speed: f32,

    /// Virtual position that owns the track at spawn.
    #[serde(default)]
    pub initial_controller: Option<Tcp>,

    /// Origin airport written on the flight plan.
    #[serde(default)]
    pub departure_airport: String,

    /// Destination written on the flight plan.
    #[serde(default)]
    pub arrival_airport: String,

    /// Flight rules.
    #[serde(default)]
    pub rules: FlightRules,

    /// Airline ICAO codes flying this overflight.
    #[serde(default = "default_airlines")]
    pub airlines: Vec<String>,

    /// Aircraft types flying this overflight.
    #[serde(default = "default_aircraft_types")]
    pub aircraft_types: Vec<String>,
}

// ---------------------------------------------------------------------------
// Scenarios and staffing
// ---------------------------------------------------------------------------

/// One staffing and runway configuration of a scenario group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Position a local single-user session signs on.
    #[serde(default)]
    pub solo_controller: Tcp,

    /// Multi-controller splits by name.
    #[serde(default)]
    pub split_configurations: BTreeMap<String, SplitConfiguration>,

    /// Split used when the request does not name one.
    #[serde(default)]
    pub default_split: String,

    /// Positions always staffed by the automation.
    #[serde(default)]
    pub virtual_controllers: Vec<Tcp>,

    /// Active departure runways.
    #[serde(default)]
    pub departure_runways: Vec<DepartureRunway>,

    /// Active arrival runways.
    #[serde(default)]
    pub arrival_runways: Vec<ArrivalRunway>,

    /// Initial launch settings.
    #[serde(default)]
    pub launch_config: LaunchConfig,

    /// Overrides the group's scope center.
    #[serde(default)]
    pub center: Option<Point2LL>,
}

/// A runway launching departures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepartureRunway {
    /// Airport ICAO code.
    pub airport: String,
    /// Runway identifier.
    pub runway: String,
    /// IFR departures per hour.
    #[serde(default)]
    pub rate: f32,
    /// VFR departures per hour.
    #[serde(default)]
    pub vfr_rate: f32,
}

/// A runway accepting arrivals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalRunway {
    /// Airport ICAO code.
    pub airport: String,
    /// Runway identifier.
    pub runway: String,
}

/// How one position in a split is covered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiUserController {
    /// The position that owns everything no one else covers.
    #[serde(default)]
    pub primary: bool,

    /// Position that takes this one's traffic when unstaffed.
    #[serde(default)]
    pub backup: Option<Tcp>,
}

/// Positions staffed in a multi-controller session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SplitConfiguration(pub BTreeMap<Tcp, MultiUserController>);

/// Backup chains longer than this are treated as cycles.
const MAX_BACKUP_HOPS: usize = 20;

impl SplitConfiguration {
    /// The position marked primary, if any.
    pub fn primary(&self) -> Option<&Tcp> {
        self.0
            .iter()
            .find_map(|(tcp, ctrl)| ctrl.primary.then_some(tcp))
    }

    /// Positions in the split.
    pub fn positions(&self) -> impl Iterator<Item = &Tcp> {
        self.0.keys()
    }

    /// Whether `tcp` is part of the split.
    pub fn contains(&self, tcp: &Tcp) -> bool {
        self.0.contains_key(tcp)
    }

    /// Follow the backup chain from `tcp` to the first position that is
    /// either primary or currently staffed.
    ///
    /// Returns `None` for a position outside the split or a chain that
    /// never reaches one.
    pub fn resolve(&self, tcp: &Tcp, is_active: impl Fn(&Tcp) -> bool) -> Option<Tcp> {
        let mut id = tcp;
        for _ in 0..MAX_BACKUP_HOPS {
            let ctrl = self.0.get(id)?;
            if ctrl.primary || is_active(id) {
                return Some(id.clone());
            }
            id = ctrl.backup.as_ref()?;
        }
        None
    }
}

/// A parsed altitude window, scaled from the compact hundreds-of-feet form.
pub fn parse_altitude_restriction_hundreds(s: &str) -> Option<AltitudeRestriction> {
    AltitudeRestriction::parse(s).map(|ar| ar.scaled(100.0))
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8000
}

const fn default_poll_interval_ms() -> u64 {
    100
}

const fn default_idle_limit_secs() -> u64 {
    // Four hours.
    14_400
}

const fn default_max_idle_sims() -> usize {
    10
}

const fn default_idle_warn_secs() -> u64 {
    5
}

const fn default_idle_sign_off_secs() -> u64 {
    15
}

const fn default_prespawn_seconds() -> u32 {
    // Twenty minutes.
    1200
}

const fn default_auto_accept_secs() -> i64 {
    4
}

const fn default_auto_accept_jitter_secs() -> i64 {
    10
}

const fn default_event_backlog_warning() -> usize {
    1000
}

const fn default_departure_altitude() -> f32 {
    5000.0
}

const fn default_cruise_altitude() -> i32 {
    35000
}

const fn default_contact_altitude() -> f32 {
    1500.0
}

const fn default_inbound_altitude() -> f32 {
    11000.0
}

const fn default_inbound_speed() -> f32 {
    280.0
}

fn default_airlines() -> Vec<String> {
    vec![
        String::from("AAL"),
        String::from("DAL"),
        String::from("JBU"),
        String::from("UAL"),
    ]
}

fn default_aircraft_types() -> Vec<String> {
    vec![String::from("A320"), String::from("B738")]
}
