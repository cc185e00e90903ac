//! The authoritative snapshot of everything a session simulates.
//!
//! [`State`] is plain data: aircraft, the controller roster, facility
//! procedures, the sim clock, and launch settings. It serializes whole, so
//! a sim can be handed to a client at sign-on or saved and reloaded.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracon_types::{
    Aircraft, Callsign, Controller, LaunchConfig, Performance, Point2LL, RestrictionArea, Tcp,
};

use crate::config::{
    Airport, ArrivalRunway, DepartureRunway, InboundFlow, Scenario, ScenarioGroup,
    SplitConfiguration,
};

/// Everything needed to build a new [`Sim`](crate::sim::Sim).
///
/// Assembled by the session manager from a TRACON, scenario group, and
/// scenario; staffing (`primary_controller`, `multi_controllers`,
/// `sign_on_positions`) depends on whether the server is local.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewSimConfiguration {
    /// TRACON identifier.
    pub tracon: String,
    /// Human-readable description shown in session lists.
    pub description: String,
    /// Airports by ICAO code.
    pub airports: BTreeMap<String, Airport>,
    /// Named fixes.
    pub fixes: BTreeMap<String, Point2LL>,
    /// Every control position in the facility.
    pub control_positions: BTreeMap<Tcp, Controller>,
    /// Performance by aircraft type.
    pub aircraft_performance: BTreeMap<String, Performance>,
    /// Arrival and overflight streams.
    pub inbound_flows: BTreeMap<String, InboundFlow>,
    /// Active departure runways.
    pub departure_runways: Vec<DepartureRunway>,
    /// Active arrival runways.
    pub arrival_runways: Vec<ArrivalRunway>,
    /// Initial launch settings.
    pub launch_config: LaunchConfig,
    /// Position whose absence pauses the sim.
    pub primary_controller: Tcp,
    /// Split for multi-controller sessions.
    pub multi_controllers: Option<SplitConfiguration>,
    /// Positions staffed by the automation.
    pub virtual_controllers: Vec<Tcp>,
    /// Positions a human may sign on to.
    pub sign_on_positions: BTreeMap<Tcp, Controller>,
    /// Scope center.
    pub center: Point2LL,
    /// Single-user local server.
    pub is_local: bool,
    /// Simulated time once prespawn completes.
    pub start_time: DateTime<Utc>,
}

impl NewSimConfiguration {
    /// Copy the facility data shared by every staffing choice.
    pub fn from_scenario(
        tracon: &str,
        description: String,
        group: &ScenarioGroup,
        scenario: &Scenario,
    ) -> Self {
        Self {
            tracon: tracon.to_owned(),
            description,
            airports: group.airports.clone(),
            fixes: group.fixes.clone(),
            control_positions: group.control_positions.clone(),
            aircraft_performance: group.aircraft_performance.clone(),
            inbound_flows: group.inbound_flows.clone(),
            departure_runways: scenario.departure_runways.clone(),
            arrival_runways: scenario.arrival_runways.clone(),
            launch_config: scenario.launch_config.clone(),
            primary_controller: Tcp::default(),
            multi_controllers: None,
            virtual_controllers: scenario.virtual_controllers.clone(),
            sign_on_positions: BTreeMap::new(),
            center: scenario.center.unwrap_or(group.center),
            is_local: false,
            start_time: Utc::now(),
        }
    }
}

/// Snapshot of all simulated entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// TRACON identifier.
    pub tracon: String,
    /// Session description.
    pub description: String,

    /// Every aircraft, keyed by callsign.
    pub aircraft: BTreeMap<Callsign, Aircraft>,
    /// Active positions: virtual ones always, human ones while signed on.
    pub controllers: BTreeMap<Tcp, Controller>,
    /// Positions currently held by humans.
    pub human_controllers: Vec<Tcp>,
    /// Position whose absence pauses the sim.
    pub primary_controller: Tcp,
    /// Split for multi-controller sessions.
    pub multi_controllers: Option<SplitConfiguration>,

    /// Airports by ICAO code.
    pub airports: BTreeMap<String, Airport>,
    /// Named fixes.
    pub fixes: BTreeMap<String, Point2LL>,
    /// Performance by aircraft type.
    pub aircraft_performance: BTreeMap<String, Performance>,
    /// Arrival and overflight streams.
    pub inbound_flows: BTreeMap<String, InboundFlow>,
    /// Active departure runways.
    pub departure_runways: Vec<DepartureRunway>,
    /// Active arrival runways.
    pub arrival_runways: Vec<ArrivalRunway>,

    /// Launch settings.
    pub launch_config: LaunchConfig,
    /// Controller-drawn restriction areas; deleted slots are kept.
    pub user_restriction_areas: Vec<RestrictionArea>,

    /// Simulated time.
    pub sim_time: DateTime<Utc>,
    /// Paused by a controller.
    pub paused: bool,
    /// Simulated seconds per real second.
    pub sim_rate: f32,
    /// IFR aircraft added so far.
    pub total_ifr: u32,
    /// VFR aircraft added so far.
    pub total_vfr: u32,

    /// Scope center.
    pub center: Point2LL,
    /// Single-user local server.
    pub is_local: bool,
}

impl State {
    /// Initial state for a new sim. Only virtual positions are active;
    /// humans are added as they sign on.
    pub fn new(config: &NewSimConfiguration) -> Self {
        let controllers = config
            .virtual_controllers
            .iter()
            .filter_map(|tcp| {
                config
                    .control_positions
                    .get(tcp)
                    .map(|ctrl| (tcp.clone(), ctrl.clone()))
            })
            .collect();

        Self {
            tracon: config.tracon.clone(),
            description: config.description.clone(),
            aircraft: BTreeMap::new(),
            controllers,
            human_controllers: Vec::new(),
            primary_controller: config.primary_controller.clone(),
            multi_controllers: config.multi_controllers.clone(),
            airports: config.airports.clone(),
            fixes: config.fixes.clone(),
            aircraft_performance: config.aircraft_performance.clone(),
            inbound_flows: config.inbound_flows.clone(),
            departure_runways: config.departure_runways.clone(),
            arrival_runways: config.arrival_runways.clone(),
            launch_config: config.launch_config.clone(),
            user_restriction_areas: Vec::new(),
            sim_time: config.start_time,
            paused: false,
            sim_rate: 1.0,
            total_ifr: 0,
            total_vfr: 0,
            center: config.center,
            is_local: config.is_local,
        }
    }

    /// Position of a named fix, airport, or procedure waypoint.
    pub fn locate(&self, name: &str) -> Option<Point2LL> {
        if let Some(&p) = self.fixes.get(name) {
            return Some(p);
        }
        if let Some(ap) = self.airports.get(name) {
            return Some(ap.location);
        }
        self.airports.values().find_map(|ap| {
            let approach_fixes = ap.approaches.values().flat_map(|a| a.waypoints.iter());
            let departure_fixes = ap
                .departure_routes
                .values()
                .flatten()
                .flat_map(|r| r.waypoints.iter());
            approach_fixes
                .chain(departure_fixes)
                .find(|wp| wp.fix == name && !wp.location.is_zero())
                .map(|wp| wp.location)
        })
    }

    /// The configured (unresolved) departure position for an aircraft:
    /// its scripted departure contact, else its arrival airport's
    /// departure controller.
    pub fn departure_controller(&self, ac: &Aircraft) -> Option<Tcp> {
        ac.departure_contact_controller.clone().or_else(|| {
            self.airports
                .get(&ac.flight_plan.arrival_airport)
                .and_then(|ap| ap.departure_controller.clone())
        })
    }

    /// Performance for an aircraft type, falling back to the defaults.
    pub fn performance(&self, aircraft_type: &str) -> Performance {
        self.aircraft_performance
            .get(aircraft_type)
            .copied()
            .unwrap_or_default()
    }

    /// Fill in waypoint locations that were left unset in config.
    pub fn resolve_waypoints(&self, waypoints: &mut [tracon_types::Waypoint]) {
        for wp in waypoints.iter_mut().filter(|wp| wp.location.is_zero()) {
            if let Some(p) = self.fixes.get(&wp.fix).copied() {
                wp.location = p;
            }
        }
    }
}
