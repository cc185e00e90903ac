//! Shared fixtures for unit tests: a small New York facility.
//!
//! Humans may sign on to `2J` (primary), `4P`, and `INS`; `N4P` (center)
//! and `JFK_TWR` are virtual. Nothing spawns on its own.

use std::collections::BTreeMap;

use chrono::DateTime;
use tracon_types::{
    Aircraft, AltitudeRestriction, Callsign, Controller, FlightPlan, LaunchConfig, NavState,
    Point2LL, Squawk, Tcp, Waypoint,
};

use crate::config::{
    Airport, Approach, DepartureRoute, MultiUserController, SimulationSettings,
    SplitConfiguration,
};
use crate::sim::Sim;
use crate::state::NewSimConfiguration;

pub(crate) fn tcp(s: &str) -> Tcp {
    Tcp::from(s)
}

fn controller(position: &str, radio_name: &str, frequency: u32, facility: &str) -> Controller {
    Controller {
        position: position.to_owned(),
        radio_name: radio_name.to_owned(),
        frequency,
        facility: facility.to_owned(),
        ..Controller::default()
    }
}

fn waypoint(fix: &str, lon: f32, lat: f32) -> Waypoint {
    Waypoint {
        fix: fix.to_owned(),
        location: Point2LL::new(lon, lat),
        ..Waypoint::default()
    }
}

fn kjfk() -> Airport {
    let mut approaches = BTreeMap::new();
    approaches.insert(
        "I22L".to_owned(),
        Approach {
            full_name: "ILS Runway 22L".to_owned(),
            runway: "22L".to_owned(),
            waypoints: vec![
                Waypoint {
                    altitude_restriction: Some(AltitudeRestriction::at(3000.0)),
                    ..waypoint("ZALPO", -73.70, 40.75)
                },
                Waypoint {
                    land: true,
                    altitude_restriction: Some(AltitudeRestriction::at(100.0)),
                    ..waypoint("_22L", -73.76, 40.65)
                },
            ],
        },
    );

    let mut departure_routes = BTreeMap::new();
    departure_routes.insert(
        "31L".to_owned(),
        vec![DepartureRoute {
            exit: "WAVEY".to_owned(),
            destinations: vec!["KMIA".to_owned()],
            route: "WAVEY Q167".to_owned(),
            waypoints: vec![waypoint("ROBER", -73.85, 40.55), waypoint("WAVEY", -73.40, 40.20)],
            initial_altitude: 5000.0,
            cruise_altitude: 35_000,
            contact_altitude: 1500.0,
            airlines: vec!["JBU".to_owned()],
            aircraft_types: vec!["A320".to_owned()],
        }],
    );

    Airport {
        name: "Kennedy".to_owned(),
        location: Point2LL::new(-73.78, 40.64),
        elevation: 13.0,
        departure_controller: Some(tcp("4P")),
        tower_controller: Some(tcp("JFK_TWR")),
        approaches,
        departure_routes,
    }
}

pub(crate) fn test_config() -> NewSimConfiguration {
    let mut control_positions = BTreeMap::new();
    control_positions.insert(tcp("2J"), controller("2J", "New York Approach", 132_400, "N90"));
    control_positions.insert(tcp("4P"), controller("4P", "New York Departure", 135_900, "N90"));
    control_positions.insert(
        tcp("INS"),
        Controller {
            instructor: true,
            ..controller("INS", "Instructor", 199_998, "N90")
        },
    );
    control_positions.insert(tcp("N4P"), controller("N4P", "New York Center", 128_300, "ZNY"));
    control_positions.insert(tcp("JFK_TWR"), controller("JFK_TWR", "Kennedy Tower", 119_100, "JFK"));

    let sign_on_positions = ["2J", "4P", "INS"]
        .into_iter()
        .filter_map(|p| control_positions.get(p).map(|c| (tcp(p), c.clone())))
        .collect();

    let mut split = BTreeMap::new();
    split.insert(
        tcp("2J"),
        MultiUserController {
            primary: true,
            backup: None,
        },
    );
    split.insert(
        tcp("4P"),
        MultiUserController {
            primary: false,
            backup: Some(tcp("2J")),
        },
    );

    let mut fixes = BTreeMap::new();
    fixes.insert("CAMRN".to_owned(), Point2LL::new(-73.86, 40.02));
    fixes.insert("ZALPO".to_owned(), Point2LL::new(-73.70, 40.75));
    fixes.insert("WAVEY".to_owned(), Point2LL::new(-73.40, 40.20));
    fixes.insert("ROBER".to_owned(), Point2LL::new(-73.85, 40.55));

    let mut airports = BTreeMap::new();
    airports.insert("KJFK".to_owned(), kjfk());

    NewSimConfiguration {
        tracon: "N90".to_owned(),
        description: "N90 test".to_owned(),
        airports,
        fixes,
        control_positions,
        launch_config: LaunchConfig::default(),
        primary_controller: tcp("2J"),
        multi_controllers: Some(SplitConfiguration(split)),
        virtual_controllers: vec![tcp("N4P"), tcp("JFK_TWR")],
        sign_on_positions,
        center: Point2LL::new(-73.78, 40.64),
        start_time: DateTime::from_timestamp(1_767_268_800, 0).unwrap_or_default(),
        ..NewSimConfiguration::default()
    }
}

pub(crate) fn test_settings() -> SimulationSettings {
    SimulationSettings {
        seed: Some(1),
        prespawn_seconds: 0,
        ..SimulationSettings::default()
    }
}

pub(crate) fn test_sim() -> Sim {
    Sim::new(test_config(), &test_settings())
}

/// Insert an aircraft near the airport at 5,000 ft, 250 kts, heading east.
pub(crate) fn add_aircraft(
    sim: &mut Sim,
    cs: &str,
    tracking: Option<&str>,
    controlling: Option<&str>,
) {
    let ac = Aircraft {
        callsign: Callsign::from(cs),
        squawk: Squawk(0o2345),
        flight_plan: FlightPlan {
            aircraft_type: "B738".to_owned(),
            departure_airport: "KBOS".to_owned(),
            arrival_airport: "KJFK".to_owned(),
            altitude: 11_000,
            ..FlightPlan::default()
        },
        nav: NavState {
            position: Point2LL::new(-73.9, 40.7),
            altitude: 5000.0,
            heading: 90.0,
            speed: 250.0,
            ..NavState::default()
        },
        tracking_controller: tracking.map(tcp),
        controlling_controller: controlling.map(tcp),
        ..Aircraft::default()
    };
    sim.state.aircraft.insert(ac.callsign.clone(), ac);
}
