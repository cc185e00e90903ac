//! Traffic generation and deferred check-ins.
//!
//! Departures are generated per departure runway, arrivals and overflights
//! per inbound flow. In automatic launch mode each source has its own
//! schedule: the next spawn is drawn around the mean interval implied by
//! its hourly rate (scaled by the launch config). In manual mode the
//! launch controller asks for aircraft and launches them explicitly.

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tracon_types::geo::heading_between;
use tracon_types::{
    Aircraft, Callsign, FlightPlan, FlightRules, LaunchMode, NavState, RadioTransmission, Squawk,
    Tcp, Waypoint,
};

use crate::aircraft::contact_message;
use crate::error::SimError;
use crate::sim::{FutureControllerContact, Sim, offset_secs};

const DEFAULT_AIRLINES: &[&str] = &["AAL", "DAL", "JBU", "UAL"];
const DEFAULT_AIRCRAFT_TYPES: &[&str] = &["A320", "B738"];
const VFR_AIRCRAFT_TYPES: &[&str] = &["C172", "PA28", "SR22"];

/// Codes never assigned to generated traffic.
const RESERVED_SQUAWKS: &[u16] = &[0o1200, 0o7500, 0o7600, 0o7700];

/// Give up looking for an unused callsign or code after this many draws.
const MAX_DRAWS: usize = 100;

/// Longest spawn interval worth scheduling, in milliseconds (about 30 years).
const MAX_SPAWN_INTERVAL_MS: f64 = 1.0e12;

/// Whole feet for a flight plan's filed altitude.
#[allow(clippy::cast_possible_truncation)]
fn filed_altitude(alt: f32) -> i32 {
    // Float-to-int `as` saturates; altitudes are far inside `i32`.
    alt.round() as i32
}

/// Spawn schedule for one departure runway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunwayLaunchState {
    /// Next automatic IFR departure.
    pub next_ifr_spawn: Option<DateTime<Utc>>,
    /// Next automatic VFR departure.
    pub next_vfr_spawn: Option<DateTime<Utc>>,
    /// Most recent launch from this runway.
    pub last_launch: Option<DateTime<Utc>>,
}

/// Spawn schedule for one inbound flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundSpawnState {
    /// Next automatic arrival.
    pub next_arrival_spawn: Option<DateTime<Utc>>,
    /// Next automatic overflight.
    pub next_overflight_spawn: Option<DateTime<Utc>>,
}

/// One automatic traffic source.
#[derive(Debug, Clone)]
enum SpawnSource {
    Departure {
        airport: String,
        runway: String,
        rules: FlightRules,
    },
    Arrival(String),
    Overflight(String),
}

impl Sim {
    // -----------------------------------------------------------------------
    // Deferred contacts
    // -----------------------------------------------------------------------

    /// Have the aircraft check in with `tcp` after `delay_secs` sim seconds.
    pub(crate) fn enqueue_controller_contact(&mut self, cs: &Callsign, tcp: Tcp, delay_secs: i64) {
        self.future_contacts.push(FutureControllerContact {
            callsign: cs.clone(),
            tcp,
            time: offset_secs(self.state.sim_time, delay_secs),
        });
    }

    /// Deliver every check-in that has come due.
    pub(crate) fn process_enqueued(&mut self) {
        let now = self.state.sim_time;
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.future_contacts)
            .into_iter()
            .partition(|fc| fc.time <= now);
        self.future_contacts = pending;

        for fc in due {
            let Some(ac) = self.state.aircraft.get_mut(&fc.callsign) else {
                continue;
            };
            ac.controlling_controller = Some(fc.tcp.clone());
            let message = contact_message(ac);
            debug!(callsign = %fc.callsign, tcp = %fc.tcp, "Controller contact");
            self.post_radio_events(
                &fc.callsign,
                vec![RadioTransmission::contact(Some(fc.tcp), message)],
            );
        }
    }

    // -----------------------------------------------------------------------
    // Automatic spawning
    // -----------------------------------------------------------------------

    /// Forget every spawn schedule; each source reschedules on the next
    /// tick.
    pub(crate) fn reset_spawn_schedules(&mut self) {
        for runways in self.departure_state.values_mut() {
            for st in runways.values_mut() {
                st.next_ifr_spawn = None;
                st.next_vfr_spawn = None;
            }
        }
        self.inbound_spawn.clear();
    }

    fn schedule_slot(&mut self, source: &SpawnSource) -> &mut Option<DateTime<Utc>> {
        match source {
            SpawnSource::Departure {
                airport,
                runway,
                rules,
            } => {
                let st = self
                    .departure_state
                    .entry(airport.clone())
                    .or_default()
                    .entry(runway.clone())
                    .or_default();
                match rules {
                    FlightRules::Ifr => &mut st.next_ifr_spawn,
                    FlightRules::Vfr => &mut st.next_vfr_spawn,
                }
            }
            SpawnSource::Arrival(flow) => {
                &mut self
                    .inbound_spawn
                    .entry(flow.clone())
                    .or_default()
                    .next_arrival_spawn
            }
            SpawnSource::Overflight(flow) => {
                &mut self
                    .inbound_spawn
                    .entry(flow.clone())
                    .or_default()
                    .next_overflight_spawn
            }
        }
    }

    /// Time until the next spawn from a source producing `rate` aircraft
    /// an hour. The first draw after (re)scheduling is spread over a whole
    /// interval so sources don't all fire together.
    ///
    /// `None` when the interval is too long to represent, which happens
    /// for vanishingly small rates.
    fn spawn_interval(&mut self, rate: f32, first: bool) -> Option<TimeDelta> {
        let mean_secs = 3600.0 / f64::from(rate);
        let factor: f64 = if first {
            self.rng.random_range(0.0..1.0)
        } else {
            self.rng.random_range(0.5..1.5)
        };
        let millis = (mean_secs * factor * 1000.0).round();
        if !millis.is_finite() || millis >= MAX_SPAWN_INTERVAL_MS {
            return None;
        }
        // Bounded above; `rate` is positive so the product is not negative.
        #[allow(clippy::cast_possible_truncation)]
        let millis = millis as i64;
        TimeDelta::try_milliseconds(millis)
    }

    /// Whether `source` is due now; reschedules it if so.
    fn spawn_due(&mut self, source: &SpawnSource, rate: f32) -> bool {
        let now = self.state.sim_time;
        let next = *self.schedule_slot(source);
        let (due, first) = match next {
            None => (false, true),
            Some(t) => (now >= t, false),
        };
        if due || first {
            // An unrepresentable interval leaves the source unscheduled; it
            // is retried on the next tick.
            let at = self
                .spawn_interval(rate, first)
                .and_then(|interval| now.checked_add_signed(interval));
            *self.schedule_slot(source) = at;
        }
        due
    }

    pub(crate) fn spawn_aircraft(&mut self) {
        if self.state.launch_config.mode != LaunchMode::Automatic {
            return;
        }
        let lc = self.state.launch_config.clone();

        let mut sources = Vec::new();
        for rwy in &self.state.departure_runways {
            for (rules, rate) in [
                (FlightRules::Ifr, rwy.rate * lc.departure_rate_scale),
                (FlightRules::Vfr, rwy.vfr_rate * lc.vfr_departure_rate_scale),
            ] {
                let source = SpawnSource::Departure {
                    airport: rwy.airport.clone(),
                    runway: rwy.runway.clone(),
                    rules,
                };
                sources.push((source, rate));
            }
        }
        for (name, flow) in &self.state.inbound_flows {
            sources.push((
                SpawnSource::Arrival(name.clone()),
                flow.arrival_rate * lc.inbound_flow_rate_scale,
            ));
            sources.push((
                SpawnSource::Overflight(name.clone()),
                flow.overflight_rate * lc.inbound_flow_rate_scale,
            ));
        }

        for (source, rate) in sources {
            if rate <= 0.0 || !rate.is_finite() || !self.spawn_due(&source, rate) {
                continue;
            }
            let (created, runway) = match &source {
                SpawnSource::Departure {
                    airport,
                    runway,
                    rules,
                } => (self.create_departure(airport, runway, *rules), Some(runway.clone())),
                SpawnSource::Arrival(flow) => (self.create_arrival_for_flow(flow), None),
                SpawnSource::Overflight(flow) => (self.create_overflight(flow), None),
            };
            if let Err(err) = created.and_then(|ac| self.launch_aircraft(ac, runway.as_deref())) {
                warn!(?source, error = %err, "Automatic spawn failed");
            }
        }
    }

    /// Run the sim forward `prespawn_seconds` so the scope is populated
    /// when the first controller arrives. Ends at the configured start
    /// time.
    pub fn prespawn(&mut self) {
        let seconds = self.settings.prespawn_seconds;
        if seconds == 0 {
            return;
        }
        let end = self.state.sim_time;
        self.state.sim_time = offset_secs(end, i64::from(seconds).saturating_neg());
        self.last_sim_update = self.state.sim_time;

        self.prespawn = true;
        for _ in 0..seconds {
            self.state.sim_time = offset_secs(self.state.sim_time, 1);
            self.update_state();
        }
        self.prespawn = false;

        self.clock.reset(Instant::now());
        info!(
            seconds,
            aircraft = self.state.aircraft.len(),
            "Prespawn complete"
        );
    }

    // -----------------------------------------------------------------------
    // Generation
    // -----------------------------------------------------------------------

    fn pick(&mut self, choices: &[String], defaults: &[&str]) -> String {
        if choices.is_empty() {
            let i = self.rng.random_range(0..defaults.len().max(1));
            return defaults.get(i).map(|s| (*s).to_owned()).unwrap_or_default();
        }
        let i = self.rng.random_range(0..choices.len());
        choices.get(i).cloned().unwrap_or_default()
    }

    fn sample_callsign(&mut self, airlines: &[String]) -> Result<Callsign, SimError> {
        for _ in 0..MAX_DRAWS {
            let airline = self.pick(airlines, DEFAULT_AIRLINES);
            let number: u16 = self.rng.random_range(1..10_000);
            let cs = Callsign::new(format!("{airline}{number}"));
            if !self.state.aircraft.contains_key(&cs) {
                return Ok(cs);
            }
        }
        Err(SimError::DuplicateCallsign)
    }

    fn sample_vfr_callsign(&mut self) -> Result<Callsign, SimError> {
        for _ in 0..MAX_DRAWS {
            let number: u16 = self.rng.random_range(100..1000);
            let a = char::from(self.rng.random_range(b'A'..=b'Z'));
            let b = char::from(self.rng.random_range(b'A'..=b'Z'));
            let cs = Callsign::new(format!("N{number}{a}{b}"));
            if !self.state.aircraft.contains_key(&cs) {
                return Ok(cs);
            }
        }
        Err(SimError::DuplicateCallsign)
    }

    fn sample_squawk(&mut self) -> Squawk {
        for _ in 0..MAX_DRAWS {
            let sq = Squawk(self.rng.random_range(0o1001..0o7777));
            let in_use = self.state.aircraft.values().any(|ac| ac.squawk == sq);
            if !RESERVED_SQUAWKS.contains(&sq.0) && !in_use {
                return sq;
            }
        }
        // The code space is far larger than any sim's traffic; give up on
        // uniqueness rather than spin.
        Squawk(0o4000)
    }

    fn new_aircraft(&mut self, callsign: Callsign, flight_plan: FlightPlan) -> Aircraft {
        let squawk = match flight_plan.rules {
            FlightRules::Ifr => self.sample_squawk(),
            FlightRules::Vfr => Squawk::VFR,
        };
        Aircraft {
            callsign,
            squawk,
            performance: self.state.performance(&flight_plan.aircraft_type),
            flight_plan,
            ..Aircraft::default()
        }
    }

    fn route_nav(&self, mut waypoints: Vec<Waypoint>, altitude: f32, speed: f32) -> NavState {
        self.state.resolve_waypoints(&mut waypoints);
        let position = waypoints.first().map(|wp| wp.location).unwrap_or_default();
        let heading = waypoints
            .get(1)
            .map_or(360.0, |next| heading_between(position, next.location));
        NavState {
            position,
            altitude,
            heading,
            speed,
            waypoints,
            ..NavState::default()
        }
    }

    /// Generate (but don't launch) a departure from `airport` runway
    /// `runway`.
    pub fn create_departure(
        &mut self,
        airport: &str,
        runway: &str,
        rules: FlightRules,
    ) -> Result<Aircraft, SimError> {
        let ap = self
            .state
            .airports
            .get(airport)
            .cloned()
            .ok_or(SimError::UnknownAirport)?;
        let routes = ap
            .departure_routes
            .get(runway)
            .filter(|r| !r.is_empty())
            .ok_or(SimError::UnknownRunway)?;
        let idx = self.rng.random_range(0..routes.len());
        let route = routes.get(idx).ok_or(SimError::UnknownRunway)?;

        let (callsign, aircraft_type) = match rules {
            FlightRules::Ifr => (
                self.sample_callsign(&route.airlines)?,
                self.pick(&route.aircraft_types, DEFAULT_AIRCRAFT_TYPES),
            ),
            FlightRules::Vfr => (self.sample_vfr_callsign()?, self.pick(&[], VFR_AIRCRAFT_TYPES)),
        };
        let destination = self.pick(&route.destinations, &[]);

        let mut ac = self.new_aircraft(
            callsign,
            FlightPlan {
                rules,
                aircraft_type,
                departure_airport: airport.to_owned(),
                arrival_airport: destination,
                altitude: route.cruise_altitude,
                route: route.route.clone(),
                cid: None,
            },
        );
        let elevation = ap.elevation;
        let mut nav = self.route_nav(route.waypoints.clone(), elevation, ac.performance.min_speed);
        nav.position = ap.location;
        if let Some(first) = nav.waypoints.first() {
            nav.heading = heading_between(ap.location, first.location);
        }
        nav.assigned_altitude = Some(route.initial_altitude);
        ac.nav = nav;

        ac.controlling_controller.clone_from(&ap.tower_controller);
        ac.departure_contact_altitude = Some(elevation + route.contact_altitude);
        ac.departure_contact_controller.clone_from(&ap.departure_controller);
        ac.waypoint_handoff_controller.clone_from(&ap.departure_controller);
        ac.hold_for_release = rules == FlightRules::Ifr && self.state.launch_config.hold_departures;
        ac.waiting_for_launch = self.state.launch_config.mode == LaunchMode::Manual;
        Ok(ac)
    }

    /// Generate an arrival to `airport` from any flow that serves it.
    pub fn create_arrival(&mut self, flow: &str, airport: &str) -> Result<Aircraft, SimError> {
        if !self.state.airports.contains_key(airport) {
            return Err(SimError::UnknownAirport);
        }
        self.generate_arrival(flow, Some(airport))
    }

    fn create_arrival_for_flow(&mut self, flow: &str) -> Result<Aircraft, SimError> {
        self.generate_arrival(flow, None)
    }

    fn generate_arrival(&mut self, flow: &str, airport: Option<&str>) -> Result<Aircraft, SimError> {
        let candidates: Vec<_> = self
            .state
            .inbound_flows
            .get(flow)
            .map(|f| {
                f.arrivals
                    .iter()
                    .filter(|a| airport.is_none_or(|ap| a.airport == ap))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if candidates.is_empty() {
            return Err(SimError::NoValidArrivalFound);
        }
        let idx = self.rng.random_range(0..candidates.len());
        let arr = candidates.get(idx).ok_or(SimError::NoValidArrivalFound)?;

        let callsign = self.sample_callsign(&arr.airlines)?;
        let aircraft_type = self.pick(&arr.aircraft_types, DEFAULT_AIRCRAFT_TYPES);
        let mut ac = self.new_aircraft(
            callsign,
            FlightPlan {
                rules: FlightRules::Ifr,
                aircraft_type,
                departure_airport: String::new(),
                arrival_airport: arr.airport.clone(),
                altitude: filed_altitude(arr.initial_altitude),
                route: String::new(),
                cid: None,
            },
        );
        ac.nav = self.route_nav(arr.waypoints.clone(), arr.initial_altitude, arr.initial_speed);
        ac.nav.assigned_altitude = arr.assigned_altitude;
        ac.nav.descend_via_star = arr.assigned_altitude.is_none();
        ac.nav.approach.expected.clone_from(&arr.expect_approach);
        ac.tracking_controller.clone_from(&arr.initial_controller);
        ac.controlling_controller.clone_from(&arr.initial_controller);
        ac.approach_controller = Some(self.state.primary_controller.clone());

        let rate = self.state.launch_config.go_around_rate;
        if self.rng.random_range(0.0..1.0) < rate {
            ac.go_around_distance = Some(self.rng.random_range(0.0_f32..1.0).mul_add(0.6, 0.1));
        }
        ac.waiting_for_launch = self.state.launch_config.mode == LaunchMode::Manual;
        Ok(ac)
    }

    /// Generate an overflight from `flow`.
    pub fn create_overflight(&mut self, flow: &str) -> Result<Aircraft, SimError> {
        let candidates = self
            .state
            .inbound_flows
            .get(flow)
            .map(|f| f.overflights.clone())
            .unwrap_or_default();
        if candidates.is_empty() {
            return Err(SimError::NoValidArrivalFound);
        }
        let idx = self.rng.random_range(0..candidates.len());
        let of = candidates.get(idx).ok_or(SimError::NoValidArrivalFound)?;

        let callsign = match of.rules {
            FlightRules::Ifr => self.sample_callsign(&of.airlines)?,
            FlightRules::Vfr => self.sample_vfr_callsign()?,
        };
        let aircraft_type = self.pick(&of.aircraft_types, DEFAULT_AIRCRAFT_TYPES);
        let mut ac = self.new_aircraft(
            callsign,
            FlightPlan {
                rules: of.rules,
                aircraft_type,
                departure_airport: of.departure_airport.clone(),
                arrival_airport: of.arrival_airport.clone(),
                altitude: filed_altitude(of.initial_altitude),
                route: String::new(),
                cid: None,
            },
        );
        ac.nav = self.route_nav(of.waypoints.clone(), of.initial_altitude, of.initial_speed);
        ac.tracking_controller.clone_from(&of.initial_controller);
        ac.controlling_controller.clone_from(&of.initial_controller);
        ac.waiting_for_launch = self.state.launch_config.mode == LaunchMode::Manual;
        Ok(ac)
    }

    /// Add a generated aircraft to the sim. IFR flights get a CID; one
    /// already on the flight plan is taken out of the free pool and must
    /// not be in use.
    pub fn launch_aircraft(
        &mut self,
        mut ac: Aircraft,
        departure_runway: Option<&str>,
    ) -> Result<(), SimError> {
        if self.state.aircraft.contains_key(&ac.callsign) {
            return Err(SimError::DuplicateCallsign);
        }
        match ac.flight_plan.rules {
            FlightRules::Ifr => {
                match &ac.flight_plan.cid {
                    Some(cid) => {
                        if !self.cids.reserve(cid) {
                            return Err(SimError::DuplicateCid);
                        }
                    }
                    None => ac.flight_plan.cid = Some(self.cids.allocate(&mut self.rng)?),
                }
                self.state.total_ifr = self.state.total_ifr.saturating_add(1);
            }
            FlightRules::Vfr => {
                self.state.total_vfr = self.state.total_vfr.saturating_add(1);
            }
        }
        ac.waiting_for_launch = false;

        if let Some(runway) = departure_runway.filter(|r| !r.is_empty()) {
            let now = self.state.sim_time;
            self.departure_state
                .entry(ac.flight_plan.departure_airport.clone())
                .or_default()
                .entry(runway.to_owned())
                .or_default()
                .last_launch = Some(now);
        }

        info!(
            callsign = %ac.callsign,
            rules = ?ac.flight_plan.rules,
            departure = %ac.flight_plan.departure_airport,
            arrival = %ac.flight_plan.arrival_airport,
            "Launched aircraft"
        );
        self.state.aircraft.insert(ac.callsign.clone(), ac);
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::float_cmp
)]
mod tests {
    use tracon_types::LaunchConfig;

    use super::*;
    use crate::config::{Arrival, DepartureRunway, InboundFlow, Overflight};
    use crate::testing::{tcp, test_sim};

    #[test]
    fn departure_from_configured_runway() {
        let mut sim = test_sim();
        let ac = sim
            .create_departure("KJFK", "31L", FlightRules::Ifr)
            .unwrap();
        assert_eq!(ac.flight_plan.departure_airport, "KJFK");
        assert_eq!(ac.nav.assigned_altitude, Some(5000.0));
        assert_eq!(ac.controlling_controller, Some(tcp("JFK_TWR")));
        assert_ne!(ac.squawk, Squawk::VFR);
        assert!(ac.flight_plan.cid.is_none());

        assert_eq!(
            sim.create_departure("KLGA", "31L", FlightRules::Ifr),
            Err(SimError::UnknownAirport)
        );
        assert_eq!(
            sim.create_departure("KJFK", "4L", FlightRules::Ifr),
            Err(SimError::UnknownRunway)
        );
    }

    #[test]
    fn vfr_departures_squawk_vfr() {
        let mut sim = test_sim();
        let ac = sim
            .create_departure("KJFK", "31L", FlightRules::Vfr)
            .unwrap();
        assert_eq!(ac.squawk, Squawk::VFR);
        assert!(ac.callsign.as_str().starts_with('N'));
        sim.launch_aircraft(ac, Some("31L")).unwrap();
        assert_eq!(sim.state.total_vfr, 1);
        assert_eq!(sim.cids.allocated_count(), 0);
    }

    #[test]
    fn launch_assigns_cid_and_rejects_duplicates() {
        let mut sim = test_sim();
        let ac = sim
            .create_departure("KJFK", "31L", FlightRules::Ifr)
            .unwrap();
        let dup = ac.clone();
        sim.launch_aircraft(ac, Some("31L")).unwrap();
        assert_eq!(
            sim.launch_aircraft(dup, None),
            Err(SimError::DuplicateCallsign)
        );
        let launched = sim.state.aircraft.values().next().unwrap();
        let cid = launched.flight_plan.cid.clone().unwrap();
        assert!(sim.cids.is_allocated(&cid));
        assert_eq!(sim.state.total_ifr, 1);
        assert!(sim.departure_state["KJFK"]["31L"].last_launch.is_some());
    }

    #[test]
    fn supplied_cid_is_taken_out_of_the_pool() {
        use rand::SeedableRng;
        use rand::rngs::StdRng;

        let mut sim = test_sim();
        let mut ac = sim
            .create_departure("KJFK", "31L", FlightRules::Ifr)
            .unwrap();
        ac.flight_plan.cid = Some("000".to_owned());
        sim.launch_aircraft(ac, Some("31L")).unwrap();
        assert!(sim.cids.is_allocated("000"));

        let mut again = sim
            .create_departure("KJFK", "31L", FlightRules::Ifr)
            .unwrap();
        again.flight_plan.cid = Some("000".to_owned());
        let callsign = again.callsign.clone();
        assert_eq!(
            sim.launch_aircraft(again, None),
            Err(SimError::DuplicateCid)
        );
        assert!(!sim.state.aircraft.contains_key(&callsign));
        assert_eq!(sim.state.total_ifr, 1);

        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..999 {
            let cid = sim.cids.allocate(&mut rng).unwrap();
            assert_ne!(cid, "000");
            assert_eq!(sim.cids.partition(&cid), Some(0));
        }
        let next = sim.cids.allocate(&mut rng).unwrap();
        assert_eq!(sim.cids.partition(&next), Some(1));
    }

    #[test]
    fn tiny_rate_scale_never_schedules() {
        let mut sim = test_sim();
        sim.state.departure_runways.push(DepartureRunway {
            airport: "KJFK".to_owned(),
            runway: "31L".to_owned(),
            rate: 30.0,
            vfr_rate: 0.0,
        });
        sim.state.launch_config = LaunchConfig {
            departure_rate_scale: 1e-12,
            ..LaunchConfig::default()
        };

        for _ in 0..600 {
            sim.state.sim_time += TimeDelta::seconds(1);
            sim.spawn_aircraft();
        }
        assert!(sim.state.aircraft.is_empty());
    }

    fn with_flow(sim: &mut Sim) {
        let wp = |fix: &str, lon: f32| Waypoint {
            fix: fix.to_owned(),
            location: tracon_types::Point2LL::new(lon, 40.6),
            ..Waypoint::default()
        };
        sim.state.inbound_flows.insert(
            "CAMRN".to_owned(),
            InboundFlow {
                arrivals: vec![Arrival {
                    airport: "KJFK".to_owned(),
                    waypoints: vec![wp("CAMRN", -73.2), wp("ZALPO", -73.6)],
                    initial_altitude: 11_000.0,
                    initial_speed: 280.0,
                    initial_controller: Some(tcp("N4P")),
                    expect_approach: Some("I22L".to_owned()),
                    ..Arrival::default()
                }],
                overflights: vec![Overflight {
                    waypoints: vec![wp("CAMRN", -73.2), wp("WAVEY", -74.0)],
                    initial_altitude: 17_000.0,
                    initial_speed: 300.0,
                    ..Overflight::default()
                }],
                arrival_rate: 30.0,
                overflight_rate: 10.0,
            },
        );
    }

    #[test]
    fn arrivals_follow_their_flow() {
        let mut sim = test_sim();
        with_flow(&mut sim);
        let ac = sim.create_arrival("CAMRN", "KJFK").unwrap();
        assert_eq!(ac.flight_plan.arrival_airport, "KJFK");
        assert_eq!(ac.tracking_controller, Some(tcp("N4P")));
        assert_eq!(ac.nav.approach.expected.as_deref(), Some("I22L"));
        assert!((ac.nav.altitude - 11_000.0).abs() < f32::EPSILON);

        assert_eq!(
            sim.create_arrival("NOPE", "KJFK"),
            Err(SimError::NoValidArrivalFound)
        );
        assert_eq!(
            sim.create_arrival("CAMRN", "KLGA"),
            Err(SimError::UnknownAirport)
        );
        let of = sim.create_overflight("CAMRN").unwrap();
        assert_eq!(of.nav.waypoints.len(), 2);
    }

    #[test]
    fn automatic_mode_spawns_and_manual_does_not() {
        let mut sim = test_sim();
        with_flow(&mut sim);
        sim.state.departure_runways.push(DepartureRunway {
            airport: "KJFK".to_owned(),
            runway: "31L".to_owned(),
            rate: 30.0,
            vfr_rate: 0.0,
        });

        for _ in 0..3600 {
            sim.state.sim_time += TimeDelta::seconds(1);
            sim.spawn_aircraft();
        }
        let spawned = sim.state.aircraft.len();
        assert!(spawned > 20, "only {spawned} spawned in an hour");
        let callsigns: std::collections::BTreeSet<_> = sim.state.aircraft.keys().collect();
        assert_eq!(callsigns.len(), spawned);

        sim.state.aircraft.clear();
        sim.state.launch_config = LaunchConfig {
            mode: LaunchMode::Manual,
            ..LaunchConfig::default()
        };
        for _ in 0..3600 {
            sim.state.sim_time += TimeDelta::seconds(1);
            sim.spawn_aircraft();
        }
        assert!(sim.state.aircraft.is_empty());
    }

    #[test]
    fn prespawn_populates_and_ends_at_start_time() {
        let mut sim = test_sim();
        with_flow(&mut sim);
        sim.settings.prespawn_seconds = 1200;
        let start = sim.state.sim_time;
        sim.prespawn();
        assert_eq!(sim.state.sim_time, start);
        assert!(!sim.prespawn);
        assert!(!sim.state.aircraft.is_empty());
    }

    #[test]
    fn due_contacts_set_controlling() {
        let mut sim = test_sim();
        crate::testing::add_aircraft(&mut sim, "AAL1", Some("2J"), Some("N4P"));
        let cs = Callsign::from("AAL1");
        sim.enqueue_controller_contact(&cs, tcp("2J"), 5);
        sim.process_enqueued();
        assert_eq!(sim.future_contacts.len(), 1);

        sim.state.sim_time += TimeDelta::seconds(5);
        sim.process_enqueued();
        assert!(sim.future_contacts.is_empty());
        assert_eq!(
            sim.state.aircraft["AAL1"].controlling_controller,
            Some(tcp("2J"))
        );
    }
}
