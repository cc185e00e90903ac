//! The per-session simulation.
//!
//! A [`Sim`] owns the [`State`] and everything that changes it over time:
//! the controller roster and event subscriptions, pending handoffs and
//! point-outs, deferred radio contacts, spawn schedules, and the CID pool.
//!
//! The owning driver calls [`Sim::update`] repeatedly. Each call converts
//! the real time elapsed since the previous call into whole simulated
//! seconds (scaled by the sim rate) and runs [`Sim::update_state`] once
//! per second. Nothing advances while the sim is paused or the primary
//! position has no human.
//!
//! Track and flight-plan operations live in `track.rs`, clearances in
//! `control.rs`, and traffic generation in `spawn.rs`; all of them are
//! `impl Sim` blocks over the fields defined here.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tracon_types::geo::nm_distance;
use tracon_types::{
    Callsign, Controller, Event, EventType, MAX_RESTRICTION_AREAS, RadioTransmission,
    RestrictionArea, Tcp, Waypoint, WorldUpdate,
};

use crate::aircraft::{
    self, CULL_DISTANCE_NM, LANDING_ALTITUDE_TOLERANCE, departure_message,
    handle_controller_disconnect, transfer_tracks,
};
use crate::cid::CidAllocator;
use crate::clock::UpdateClock;
use crate::config::SimulationSettings;
use crate::dynamics::{AircraftDynamics, KinematicDynamics};
use crate::error::SimError;
use crate::events::{EventStream, EventsSubscription};
use crate::spawn::{InboundSpawnState, RunwayLaunchState};
use crate::state::{NewSimConfiguration, State};

/// More steps than this in one update means the driver fell behind.
const MAX_STEPS_BEFORE_WARNING: u64 = 10;

/// Updates slower than this are logged.
const SLOW_UPDATE: Duration = Duration::from_millis(200);

/// An outstanding handoff offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    /// Sim time after which a non-human receiver accepts.
    pub auto_accept_time: DateTime<Utc>,
    /// Facility of the receiving position.
    pub receiving_facility: String,
}

/// An outstanding point-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointOut {
    /// Position that pointed the aircraft out.
    pub from: Tcp,
    /// Position it was pointed out to.
    pub to: Tcp,
    /// Sim time after which a non-human recipient acknowledges.
    pub accept_time: DateTime<Utc>,
}

/// A radio check-in scheduled for later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureControllerContact {
    /// Aircraft that will check in.
    pub callsign: Callsign,
    /// Position it will contact.
    pub tcp: Tcp,
    /// Sim time of the check-in.
    pub time: DateTime<Utc>,
}

/// Serializable form of a sim, with human positions removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSnapshot {
    /// Simulated entities.
    pub state: State,
    /// Positions a human may sign on to.
    pub sign_on_positions: BTreeMap<Tcp, Controller>,
    /// Outstanding handoffs.
    pub handoffs: BTreeMap<Callsign, Handoff>,
    /// Outstanding point-outs.
    pub point_outs: BTreeMap<Callsign, PointOut>,
    /// Scheduled check-ins.
    pub future_contacts: Vec<FutureControllerContact>,
    /// Next spawn times per airport and runway.
    pub departure_state: BTreeMap<String, BTreeMap<String, RunwayLaunchState>>,
    /// Next spawn times per inbound flow.
    pub inbound_spawn: BTreeMap<String, InboundSpawnState>,
    /// Sim time of the last per-aircraft step.
    pub last_sim_update: DateTime<Utc>,
}

/// One simulation session.
#[derive(Debug)]
pub struct Sim {
    pub(crate) state: State,
    pub(crate) sign_on_positions: BTreeMap<Tcp, Controller>,

    /// Human positions and their event subscriptions.
    pub(crate) human_controllers: BTreeMap<Tcp, EventsSubscription>,
    pub(crate) instructors: BTreeSet<Tcp>,
    pub(crate) event_stream: EventStream,

    pub(crate) handoffs: BTreeMap<Callsign, Handoff>,
    pub(crate) point_outs: BTreeMap<Callsign, PointOut>,
    pub(crate) future_contacts: Vec<FutureControllerContact>,

    pub(crate) departure_state: BTreeMap<String, BTreeMap<String, RunwayLaunchState>>,
    pub(crate) inbound_spawn: BTreeMap<String, InboundSpawnState>,
    pub(crate) cids: CidAllocator,

    pub(crate) clock: UpdateClock,
    pub(crate) last_sim_update: DateTime<Utc>,
    pub(crate) prespawn: bool,

    pub(crate) rng: StdRng,
    pub(crate) dynamics: Box<dyn AircraftDynamics>,
    pub(crate) settings: SimulationSettings,
}

impl Sim {
    /// Build a sim from a validated configuration. No human is signed on
    /// yet, so the sim does not advance until the primary signs on.
    pub fn new(config: NewSimConfiguration, settings: &SimulationSettings) -> Self {
        let state = State::new(&config);
        let last_sim_update = state.sim_time;
        Self {
            state,
            sign_on_positions: config.sign_on_positions,
            human_controllers: BTreeMap::new(),
            instructors: BTreeSet::new(),
            event_stream: EventStream::new(settings.event_backlog_warning),
            handoffs: BTreeMap::new(),
            point_outs: BTreeMap::new(),
            future_contacts: Vec::new(),
            departure_state: BTreeMap::new(),
            inbound_spawn: BTreeMap::new(),
            cids: CidAllocator::new(),
            clock: UpdateClock::new(Instant::now()),
            last_sim_update,
            prespawn: false,
            rng: seeded_rng(settings.seed),
            dynamics: Box::new(KinematicDynamics),
            settings: settings.clone(),
        }
    }

    /// Rebuild a sim from a snapshot. CIDs held by its aircraft are taken
    /// out of the free pool.
    pub fn from_snapshot(snapshot: SimSnapshot, settings: &SimulationSettings) -> Self {
        let mut cids = CidAllocator::new();
        for (cs, ac) in &snapshot.state.aircraft {
            if let Some(cid) = &ac.flight_plan.cid
                && !cids.reserve(cid)
            {
                warn!(callsign = %cs, cid = %cid, "Duplicate CID in snapshot");
            }
        }

        Self {
            state: snapshot.state,
            sign_on_positions: snapshot.sign_on_positions,
            human_controllers: BTreeMap::new(),
            instructors: BTreeSet::new(),
            event_stream: EventStream::new(settings.event_backlog_warning),
            handoffs: snapshot.handoffs,
            point_outs: snapshot.point_outs,
            future_contacts: snapshot.future_contacts,
            departure_state: snapshot.departure_state,
            inbound_spawn: snapshot.inbound_spawn,
            cids,
            clock: UpdateClock::new(Instant::now()),
            last_sim_update: snapshot.last_sim_update,
            prespawn: false,
            rng: seeded_rng(settings.seed),
            dynamics: Box::new(KinematicDynamics),
            settings: settings.clone(),
        }
    }

    /// Replace the motion model.
    #[must_use]
    pub fn with_dynamics(mut self, dynamics: Box<dyn AircraftDynamics>) -> Self {
        self.dynamics = dynamics;
        self
    }

    /// The simulated entities.
    pub const fn state(&self) -> &State {
        &self.state
    }

    /// Snapshot for transfer to another server, with every human position
    /// removed from the roster.
    pub fn serialize_snapshot(&self) -> SimSnapshot {
        let mut state = self.state.clone();
        for tcp in std::mem::take(&mut state.human_controllers) {
            state.controllers.remove(&tcp);
        }
        SimSnapshot {
            state,
            sign_on_positions: self.sign_on_positions.clone(),
            handoffs: self.handoffs.clone(),
            point_outs: self.point_outs.clone(),
            future_contacts: self.future_contacts.clone(),
            departure_state: self.departure_state.clone(),
            inbound_spawn: self.inbound_spawn.clone(),
            last_sim_update: self.last_sim_update,
        }
    }

    // -----------------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------------

    /// Whether a human currently holds `tcp`.
    pub fn is_active_human(&self, tcp: &Tcp) -> bool {
        self.human_controllers.contains_key(tcp)
    }

    /// Whether `tcp` signed on as an instructor.
    pub fn is_instructor(&self, tcp: &Tcp) -> bool {
        self.instructors.contains(tcp)
    }

    /// Positions currently held by humans.
    pub fn active_controllers(&self) -> Vec<Tcp> {
        self.human_controllers.keys().cloned().collect()
    }

    /// Positions open for sign-on and positions already covered.
    ///
    /// Available is the primary plus the split's positions, less anything
    /// a human holds. Covered is every human position.
    pub fn available_covered_positions(
        &self,
    ) -> (BTreeMap<Tcp, Controller>, BTreeMap<Tcp, Controller>) {
        let lookup = |tcp: &Tcp| {
            self.sign_on_positions
                .get(tcp)
                .or_else(|| self.state.controllers.get(tcp))
                .cloned()
        };

        let split = self
            .state
            .multi_controllers
            .iter()
            .flat_map(|split| split.positions());
        let available = std::iter::once(&self.state.primary_controller)
            .chain(split)
            .filter(|tcp| !self.is_active_human(tcp))
            .filter_map(|tcp| lookup(tcp).map(|ctrl| (tcp.clone(), ctrl)))
            .collect();
        let covered = self
            .human_controllers
            .keys()
            .filter_map(|tcp| lookup(tcp).map(|ctrl| (tcp.clone(), ctrl)))
            .collect();
        (available, covered)
    }

    fn check_sign_on(&self, tcp: &Tcp) -> Result<Controller, SimError> {
        if self.is_active_human(tcp) {
            return Err(SimError::ControllerAlreadySignedIn);
        }
        if self.state.controllers.contains_key(tcp) {
            // Staffed by the automation.
            return Err(SimError::InvalidController);
        }
        self.sign_on_positions
            .get(tcp)
            .cloned()
            .ok_or(SimError::NoController)
    }

    fn install_human(
        &mut self,
        tcp: &Tcp,
        ctrl: Controller,
        instructor: bool,
        sub: EventsSubscription,
    ) {
        self.human_controllers.insert(tcp.clone(), sub);
        self.state.controllers.insert(tcp.clone(), ctrl);
        self.state.human_controllers.push(tcp.clone());
        if *tcp == self.state.primary_controller {
            // Don't try to catch up on the time nobody was here.
            self.clock.reset(Instant::now());
        }
        if instructor {
            self.instructors.insert(tcp.clone());
        }
    }

    fn remove_human(&mut self, tcp: &Tcp) {
        self.state.controllers.remove(tcp);
        self.state.human_controllers.retain(|t| t != tcp);
        self.instructors.remove(tcp);
    }

    /// Put a human on `tcp`.
    pub fn sign_on(&mut self, tcp: &Tcp, instructor: bool) -> Result<(), SimError> {
        let ctrl = self.check_sign_on(tcp)?;
        let sub = self.event_stream.subscribe();
        self.install_human(tcp, ctrl, instructor, sub);

        self.post_event(Event::status(format!("{tcp} has signed on.")));
        info!(tcp = %tcp, instructor, "Controller signed on");
        Ok(())
    }

    /// Take the human off `tcp`, handing its aircraft to the primary.
    pub fn sign_off(&mut self, tcp: &Tcp) -> Result<(), SimError> {
        let sub = self
            .human_controllers
            .remove(tcp)
            .ok_or(SimError::NoController)?;
        self.event_stream.unsubscribe(sub);

        let primary = self.state.primary_controller.clone();
        for ac in self.state.aircraft.values_mut() {
            handle_controller_disconnect(ac, tcp, &primary);
        }
        if self.state.launch_config.controller.as_ref() == Some(tcp) {
            self.state.launch_config.controller = None;
        }
        self.remove_human(tcp);

        self.post_event(Event::status(format!("{tcp} has signed off.")));
        info!(tcp = %tcp, "Controller signed off");
        Ok(())
    }

    /// Move a human from `from` to `to`, carrying their unread events.
    ///
    /// With `keep_tracks`, every reference to `from` becomes `to`;
    /// otherwise `from`'s aircraft go to the primary as on sign-off. If
    /// `to` cannot be signed on, `from` is left as it was.
    pub fn change_control_position(
        &mut self,
        from: &Tcp,
        to: &Tcp,
        keep_tracks: bool,
    ) -> Result<(), SimError> {
        if !self.is_active_human(from) {
            return Err(SimError::NoController);
        }
        let ctrl = self.check_sign_on(to)?;
        let instructor = self.is_instructor(from);
        let sub = self
            .human_controllers
            .remove(from)
            .ok_or(SimError::NoController)?;

        self.install_human(to, ctrl, instructor, sub);
        self.post_event(Event::status(format!("{to} has signed on.")));
        self.remove_human(from);
        self.post_event(Event::status(format!("{from} has signed off.")));

        let primary = self.state.primary_controller.clone();
        for ac in self.state.aircraft.values_mut() {
            if keep_tracks {
                transfer_tracks(ac, from, to);
            } else {
                handle_controller_disconnect(ac, from, &primary);
            }
        }
        if self.state.launch_config.controller.as_ref() == Some(from) {
            self.state.launch_config.controller = keep_tracks.then(|| to.clone());
        }

        info!(from = %from, to = %to, keep_tracks, "Controller changed position");
        Ok(())
    }

    /// Follow the split's backup chain from `tcp` to a staffed position,
    /// falling back to the primary.
    pub fn resolve_controller(&self, tcp: Option<&Tcp>) -> Tcp {
        let primary = &self.state.primary_controller;
        let (Some(split), Some(tcp)) = (&self.state.multi_controllers, tcp) else {
            return primary.clone();
        };
        split
            .resolve(tcp, |t| self.is_active_human(t))
            .unwrap_or_else(|| {
                warn!(tcp = %tcp, "Unable to resolve controller; using primary");
                primary.clone()
            })
    }

    // -----------------------------------------------------------------------
    // Session-wide controls
    // -----------------------------------------------------------------------

    /// Pause or resume the sim.
    pub fn toggle_pause(&mut self, tcp: &Tcp) {
        self.state.paused = !self.state.paused;
        self.clock.reset(Instant::now());

        let verb = if self.state.paused { "paused" } else { "unpaused" };
        self.post_event(Event {
            from_controller: Some(tcp.clone()),
            message: format!("{tcp} has {verb} the sim"),
            ..Event::new(EventType::GlobalMessage)
        });
        info!(tcp = %tcp, paused = self.state.paused, "Sim pause toggled");
    }

    /// Change how many simulated seconds pass per real second.
    pub fn set_sim_rate(&mut self, tcp: &Tcp, rate: f32) -> Result<(), SimError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(SimError::UnableCommand);
        }
        self.state.sim_rate = rate;
        info!(tcp = %tcp, rate, "Sim rate changed");
        Ok(())
    }

    /// Broadcast a message from `tcp` to every position.
    pub fn global_message(&mut self, tcp: &Tcp, message: &str) {
        self.post_event(Event {
            from_controller: Some(tcp.clone()),
            message: message.to_owned(),
            ..Event::new(EventType::GlobalMessage)
        });
    }

    /// Real time since the sim last advanced.
    pub fn idle_time(&self) -> Duration {
        self.clock.idle_time(Instant::now())
    }

    /// Publish an event to every human position.
    pub fn post_event(&mut self, event: Event) {
        self.event_stream.post(event);
    }

    pub(crate) fn post_radio_events(&mut self, callsign: &Callsign, rts: Vec<RadioTransmission>) {
        for rt in rts {
            self.post_event(Event {
                callsign: Some(callsign.clone()),
                to_controller: rt.controller,
                message: rt.message,
                radio_transmission_type: Some(rt.transmission_type),
                ..Event::new(EventType::RadioTransmission)
            });
        }
    }

    /// Sim time at which an automated position responds to an offer.
    pub(crate) fn auto_accept_time(&mut self) -> DateTime<Utc> {
        let jitter = if self.settings.auto_accept_jitter_secs > 0 {
            self.rng
                .random_range(0..self.settings.auto_accept_jitter_secs)
        } else {
            0
        };
        offset_secs(
            self.state.sim_time,
            self.settings.auto_accept_secs.saturating_add(jitter),
        )
    }

    // -----------------------------------------------------------------------
    // Restriction areas
    // -----------------------------------------------------------------------

    /// Add a restriction area; returns its 1-based index.
    pub fn create_restriction_area(&mut self, mut ra: RestrictionArea) -> Result<usize, SimError> {
        ra.deleted = false;
        let areas = &mut self.state.user_restriction_areas;
        if areas.len() < MAX_RESTRICTION_AREAS {
            areas.push(ra);
            return Ok(areas.len());
        }
        let (i, slot) = areas
            .iter_mut()
            .enumerate()
            .find(|(_, a)| a.deleted)
            .ok_or(SimError::TooManyRestrictionAreas)?;
        *slot = ra;
        Ok(i.saturating_add(1))
    }

    fn restriction_area_mut(&mut self, idx: usize) -> Result<&mut RestrictionArea, SimError> {
        idx.checked_sub(1)
            .and_then(|i| self.state.user_restriction_areas.get_mut(i))
            .filter(|ra| !ra.deleted)
            .ok_or(SimError::InvalidRestrictionAreaIndex)
    }

    /// Replace the area at a 1-based index.
    pub fn update_restriction_area(
        &mut self,
        idx: usize,
        mut ra: RestrictionArea,
    ) -> Result<(), SimError> {
        let slot = self.restriction_area_mut(idx)?;
        ra.deleted = false;
        *slot = ra;
        Ok(())
    }

    /// Delete the area at a 1-based index. The slot stays so later indices
    /// don't shift.
    pub fn delete_restriction_area(&mut self, idx: usize) -> Result<(), SimError> {
        let slot = self.restriction_area_mut(idx)?;
        *slot = RestrictionArea {
            deleted: true,
            ..RestrictionArea::default()
        };
        Ok(())
    }

    // -----------------------------------------------------------------------
    // World update
    // -----------------------------------------------------------------------

    /// Owned snapshot for one position, with the events it has not yet
    /// seen.
    pub fn get_world_update(&mut self, tcp: &Tcp) -> WorldUpdate {
        let events = match self.human_controllers.get(tcp) {
            Some(sub) => self.event_stream.get(sub),
            None => Vec::new(),
        };
        WorldUpdate {
            aircraft: self.state.aircraft.clone(),
            controllers: self.state.controllers.clone(),
            human_controllers: self.state.human_controllers.clone(),
            instructors: self.instructors.iter().cloned().collect(),
            time: self.state.sim_time,
            launch_config: self.state.launch_config.clone(),
            user_restriction_areas: self.state.user_restriction_areas.clone(),
            sim_is_paused: self.state.paused,
            sim_rate: self.state.sim_rate,
            total_ifr: self.state.total_ifr,
            total_vfr: self.state.total_vfr,
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Update loop
    // -----------------------------------------------------------------------

    /// Advance the sim to the current wall-clock time.
    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// Advance the sim to `now`.
    pub fn update_at(&mut self, now: Instant) {
        let started = Instant::now();

        for (cs, ac) in &self.state.aircraft {
            let problems = aircraft::check(ac);
            if !problems.is_empty() {
                warn!(callsign = %cs, ?problems, "Aircraft failed sanity check");
            }
        }

        if self.state.paused || !self.is_active_human(&self.state.primary_controller) {
            return;
        }

        let steps = self.clock.advance(now, self.state.sim_rate);
        if steps > MAX_STEPS_BEFORE_WARNING {
            warn!(steps, "Sim update fell behind");
        }
        for _ in 0..steps {
            self.state.sim_time = offset_secs(self.state.sim_time, 1);
            self.update_state();
        }

        let took = started.elapsed();
        if took > SLOW_UPDATE {
            warn!(took_ms = took.as_secs_f64() * 1000.0, steps, "Slow sim update");
        }
    }

    /// One simulated second: coordination timers first, then aircraft.
    pub fn update_state(&mut self) {
        let now = self.state.sim_time;
        self.resolve_handoffs(now);
        self.resolve_point_outs(now);

        if now.signed_duration_since(self.last_sim_update) < TimeDelta::seconds(1) {
            return;
        }
        self.last_sim_update = now;

        let callsigns: Vec<Callsign> = self.state.aircraft.keys().cloned().collect();
        for cs in &callsigns {
            self.step_aircraft(cs);
        }

        self.process_enqueued();
        self.spawn_aircraft();
        self.propagate_automation(now);
    }

    fn resolve_handoffs(&mut self, now: DateTime<Utc>) {
        let due: Vec<Callsign> = self
            .handoffs
            .iter()
            .filter(|(_, ho)| self.prespawn || now > ho.auto_accept_time)
            .map(|(cs, _)| cs.clone())
            .collect();

        for cs in due {
            let Some(ho) = self.handoffs.remove(&cs) else {
                continue;
            };
            let Some(ac) = self.state.aircraft.get(&cs) else {
                continue;
            };
            let Some(to) = ac.handoff_track_controller.clone() else {
                continue;
            };
            if self.is_active_human(&to) {
                continue;
            }
            let from = ac.tracking_controller.clone();

            self.post_event(Event::coordination(
                EventType::AcceptedHandoff,
                cs.clone(),
                from.clone(),
                Some(to.clone()),
            ));
            info!(
                callsign = %cs,
                from = from.as_ref().map_or("", Tcp::as_str),
                to = %to,
                "Automatic handoff accept"
            );
            self.propagate_facility(&cs, &to, &ho);

            if let Some(ac) = self.state.aircraft.get_mut(&cs) {
                ac.tracking_controller = Some(to);
                ac.handoff_track_controller = None;
            }
        }
    }

    /// Inter-facility handoffs have no downstream automation here; record
    /// that one would have been sent.
    fn propagate_facility(&self, cs: &Callsign, to: &Tcp, ho: &Handoff) {
        let local = self
            .state
            .controllers
            .get(&self.state.primary_controller)
            .map(|c| c.facility.as_str());
        if !ho.receiving_facility.is_empty() && local != Some(ho.receiving_facility.as_str()) {
            debug!(
                callsign = %cs,
                to = %to,
                facility = %ho.receiving_facility,
                "Handoff accepted by another facility"
            );
        }
    }

    fn resolve_point_outs(&mut self, now: DateTime<Utc>) {
        let due: Vec<Callsign> = self
            .point_outs
            .iter()
            .filter(|(_, po)| now > po.accept_time && !self.is_active_human(&po.to))
            .map(|(cs, _)| cs.clone())
            .collect();

        for cs in due {
            let Some(po) = self.point_outs.remove(&cs) else {
                continue;
            };
            if !self.state.aircraft.contains_key(&cs) {
                continue;
            }
            // The acknowledgement goes back the other way.
            self.post_event(Event::coordination(
                EventType::AcknowledgedPointOut,
                cs.clone(),
                Some(po.to.clone()),
                Some(po.from.clone()),
            ));
            info!(callsign = %cs, by = %po.to, "Automatic point out acknowledged");
        }
    }

    fn step_aircraft(&mut self, cs: &Callsign) {
        let dynamics = &self.dynamics;
        let Some(ac) = self.state.aircraft.get_mut(cs) else {
            return;
        };
        if (ac.hold_for_release && !ac.released) || ac.waiting_for_launch {
            return;
        }

        if let Some(wp) = dynamics.update(ac)
            && !self.apply_waypoint(cs, &wp)
        {
            return;
        }

        self.check_go_around(cs);
        self.check_departure_contact(cs);

        if let Some(ac) = self.state.aircraft.get(cs) {
            let distance = nm_distance(ac.position(), self.state.center);
            if distance > CULL_DISTANCE_NM {
                info!(callsign = %cs, distance, "Culled aircraft");
                self.delete_aircraft_internal(cs);
            }
        }
    }

    /// Run a passed waypoint's scripted actions. Returns `false` when the
    /// rest of this aircraft's step should be skipped.
    fn apply_waypoint(&mut self, cs: &Callsign, wp: &Waypoint) -> bool {
        let Some(ac) = self.state.aircraft.get(cs) else {
            return false;
        };
        let tracking = ac.tracking_controller.clone();
        let controlling = ac.controlling_controller.clone();
        let waypoint_ctrl = ac.waypoint_handoff_controller.clone();
        let altitude = ac.altitude();

        if wp.human_handoff {
            let to = self.resolve_controller(waypoint_ctrl.as_ref());
            self.offer_handoff(cs, tracking, to);
        } else if let Some(to) = &wp.tcp_handoff {
            self.offer_handoff(cs, tracking, to.clone());
        }

        if wp.transfer_comms {
            let to = self.resolve_controller(waypoint_ctrl.as_ref());
            self.enqueue_controller_contact(cs, to, 0);
        }

        let human_controlled = controlling
            .as_ref()
            .is_some_and(|tcp| self.is_active_human(tcp));
        if !human_controlled && let Some(ac) = self.state.aircraft.get_mut(cs) {
            if let Some(sp) = &wp.primary_scratchpad {
                ac.scratchpad.clone_from(sp);
            }
            if wp.clear_primary_scratchpad {
                ac.scratchpad.clear();
            }
            if let Some(sp) = &wp.secondary_scratchpad {
                ac.secondary_scratchpad.clone_from(sp);
            }
            if wp.clear_secondary_scratchpad {
                ac.secondary_scratchpad.clear();
            }
        }

        if let Some(to) = &wp.point_out
            && !human_controlled
            && self.state.controllers.contains_key(to)
            && let Some(from) = controlling.clone()
        {
            self.start_point_out(cs, from, to.clone());
            return false;
        }

        if wp.delete {
            info!(callsign = %cs, fix = %wp.fix, "Deleting aircraft at waypoint");
            self.delete_aircraft_internal(cs);
            return false;
        }

        if wp.land {
            let low_enough = wp.altitude_restriction.is_none_or(|ar| {
                altitude <= ar.target_altitude(altitude) + LANDING_ALTITUDE_TOLERANCE
            });
            if low_enough {
                info!(callsign = %cs, fix = %wp.fix, "Aircraft landed");
                self.delete_aircraft_internal(cs);
                return false;
            }
            info!(callsign = %cs, altitude, "Too high at threshold; going around");
            self.go_around(cs);
        }
        true
    }

    /// Offer a handoff on the automation's behalf.
    pub(crate) fn offer_handoff(&mut self, cs: &Callsign, from: Option<Tcp>, to: Tcp) {
        self.post_event(Event::coordination(
            EventType::OfferedHandoff,
            cs.clone(),
            from,
            Some(to.clone()),
        ));
        let receiving_facility = self
            .state
            .controllers
            .get(&to)
            .map(|c| c.facility.clone())
            .unwrap_or_default();
        let auto_accept_time = self.auto_accept_time();
        if let Some(ac) = self.state.aircraft.get_mut(cs) {
            ac.handoff_track_controller = Some(to);
        }
        self.handoffs.insert(
            cs.clone(),
            Handoff {
                auto_accept_time,
                receiving_facility,
            },
        );
    }

    /// Record a point-out and tell everyone.
    pub(crate) fn start_point_out(&mut self, cs: &Callsign, from: Tcp, to: Tcp) {
        self.post_event(Event::coordination(
            EventType::PointOut,
            cs.clone(),
            Some(from.clone()),
            Some(to.clone()),
        ));
        let accept_time = self.auto_accept_time();
        self.point_outs.insert(
            cs.clone(),
            PointOut {
                from,
                to,
                accept_time,
            },
        );
    }

    fn check_go_around(&mut self, cs: &Callsign) {
        let Some(ac) = self.state.aircraft.get(cs) else {
            return;
        };
        let Some(threshold) = ac.go_around_distance else {
            return;
        };
        let Some(remaining) = self.dynamics.distance_to_end_of_approach(ac) else {
            return;
        };
        if remaining < threshold {
            info!(callsign = %cs, remaining, "Random go around");
            self.go_around(cs);
        }
    }

    fn check_departure_contact(&mut self, cs: &Callsign) {
        if self.prespawn {
            return;
        }
        let Some(ac) = self.state.aircraft.get(cs) else {
            return;
        };
        let Some(contact_altitude) = ac.departure_contact_altitude else {
            return;
        };
        if ac.altitude() < contact_altitude {
            return;
        }

        let ctrl = self.resolve_controller(ac.departure_contact_controller.as_ref());
        let airport = self
            .state
            .airports
            .get(&ac.flight_plan.departure_airport)
            .map_or_else(
                || ac.flight_plan.departure_airport.clone(),
                |ap| ap.name.clone(),
            );
        let message = format!("departing {airport}, {}", departure_message(ac));

        if let Some(ac) = self.state.aircraft.get_mut(cs) {
            ac.departure_contact_altitude = None;
            ac.controlling_controller = Some(ctrl.clone());
        }
        info!(callsign = %cs, tcp = %ctrl, "Departure contact");
        self.post_radio_events(cs, vec![RadioTransmission::contact(Some(ctrl), message)]);
    }

    /// Abandon the approach and come back to departure control.
    pub(crate) fn go_around(&mut self, cs: &Callsign) {
        let departure = self
            .state
            .aircraft
            .get(cs)
            .and_then(|ac| self.state.departure_controller(ac))
            .map(|tcp| self.resolve_controller(Some(&tcp)));

        let Some(ac) = self.state.aircraft.get_mut(cs) else {
            return;
        };
        // Set first so the transmission is addressed to departure.
        ac.controlling_controller.clone_from(&departure);
        let rts = aircraft::go_around(ac);

        let approach = ac.approach_controller.clone();
        let offer = match &ac.tracking_controller {
            Some(tracking) if approach.as_ref() != Some(tracking) => {
                ac.handoff_track_controller = departure.or_else(|| approach.clone());
                Some(tracking.clone())
            }
            _ => None,
        };

        self.post_radio_events(cs, rts);
        if let Some(tracking) = offer {
            self.post_event(Event::coordination(
                EventType::OfferedHandoff,
                cs.clone(),
                Some(tracking),
                approach,
            ));
        }
    }

    /// Per-second bookkeeping for datablock state.
    fn propagate_automation(&mut self, now: DateTime<Utc>) {
        for ac in self.state.aircraft.values_mut() {
            if ac.ident_until.is_some_and(|t| t <= now) {
                ac.ident_until = None;
            }
            if ac.handoff_track_controller.is_none() && ac.redirected_handoff.is_some() {
                ac.redirected_handoff = None;
            }
        }
    }

    /// Remove an aircraft and everything pending for it.
    pub(crate) fn delete_aircraft_internal(&mut self, cs: &Callsign) -> bool {
        let Some(ac) = self.state.aircraft.remove(cs) else {
            return false;
        };
        if let Some(cid) = &ac.flight_plan.cid {
            self.cids.release(cid);
        }
        self.handoffs.remove(cs);
        self.point_outs.remove(cs);
        self.future_contacts.retain(|fc| fc.callsign != *cs);
        true
    }
}

/// `t` moved by `secs` seconds, pinned to the representable range.
pub(crate) fn offset_secs(t: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    TimeDelta::try_seconds(secs)
        .and_then(|delta| t.checked_add_signed(delta))
        .unwrap_or(if secs < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::float_cmp
)]
mod tests {
    use tracon_types::{AltitudeRestriction, Aircraft, LaunchMode, Point2LL};

    use super::*;
    use crate::testing::{add_aircraft, tcp, test_sim};

    fn events_of(sim: &mut Sim, who: &str, kind: EventType) -> Vec<Event> {
        sim.get_world_update(&tcp(who))
            .events
            .into_iter()
            .filter(|e| e.event_type == kind)
            .collect()
    }

    #[test]
    fn sign_on_rejects_occupied_virtual_and_unknown_positions() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        assert_eq!(
            sim.sign_on(&tcp("2J"), false),
            Err(SimError::ControllerAlreadySignedIn)
        );
        assert_eq!(sim.sign_on(&tcp("N4P"), false), Err(SimError::InvalidController));
        assert_eq!(sim.sign_on(&tcp("ZZZ"), false), Err(SimError::NoController));
        assert_eq!(sim.active_controllers(), vec![tcp("2J")]);
    }

    #[test]
    fn sign_on_is_announced() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        sim.sign_on(&tcp("4P"), false).unwrap();
        let status = events_of(&mut sim, "2J", EventType::StatusMessage);
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].message, "2J has signed on.");
        assert_eq!(status[1].message, "4P has signed on.");
    }

    #[test]
    fn sign_off_hands_everything_to_primary() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        sim.sign_on(&tcp("4P"), false).unwrap();
        for cs in ["AAL1", "AAL2", "AAL3"] {
            add_aircraft(&mut sim, cs, Some("4P"), Some("4P"));
        }
        add_aircraft(&mut sim, "AAL4", Some("2J"), Some("2J"));
        sim.state.aircraft.get_mut("AAL4").unwrap().handoff_track_controller = Some(tcp("4P"));
        sim.state.launch_config.controller = Some(tcp("4P"));

        sim.sign_off(&tcp("4P")).unwrap();

        let four_p = tcp("4P");
        assert!(sim.state.aircraft.values().all(|ac| {
            ac.tracking_controller.as_ref() != Some(&four_p)
                && ac.controlling_controller.as_ref() != Some(&four_p)
                && ac.handoff_track_controller.as_ref() != Some(&four_p)
        }));
        assert_eq!(
            sim.state.aircraft["AAL1"].tracking_controller,
            Some(tcp("2J"))
        );
        assert!(sim.state.launch_config.controller.is_none());
        assert!(!sim.state.controllers.contains_key("4P"));
        assert_eq!(sim.sign_off(&tcp("4P")), Err(SimError::NoController));
    }

    #[test]
    fn change_position_keeps_unread_events_and_tracks() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        sim.sign_on(&tcp("4P"), true).unwrap();
        add_aircraft(&mut sim, "JBU9", Some("4P"), Some("4P"));
        sim.global_message(&tcp("2J"), "hello");

        sim.change_control_position(&tcp("4P"), &tcp("INS"), true)
            .unwrap();

        assert!(sim.is_active_human(&tcp("INS")));
        assert!(!sim.is_active_human(&tcp("4P")));
        assert!(sim.is_instructor(&tcp("INS")));
        assert_eq!(
            sim.state.aircraft["JBU9"].tracking_controller,
            Some(tcp("INS"))
        );
        let msgs = events_of(&mut sim, "INS", EventType::GlobalMessage);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].message, "hello");
    }

    #[test]
    fn failed_change_position_leaves_origin_alone() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        sim.sign_on(&tcp("4P"), false).unwrap();
        assert_eq!(
            sim.change_control_position(&tcp("4P"), &tcp("2J"), false),
            Err(SimError::ControllerAlreadySignedIn)
        );
        assert!(sim.is_active_human(&tcp("4P")));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_advances_without_the_primary() {
        let mut sim = test_sim();
        let start = sim.state.sim_time;
        tokio::time::advance(Duration::from_secs(3)).await;
        sim.update();
        assert_eq!(sim.state.sim_time, start);

        sim.sign_on(&tcp("2J"), false).unwrap();
        tokio::time::advance(Duration::from_millis(2500)).await;
        sim.update();
        assert_eq!(sim.state.sim_time, start + TimeDelta::seconds(2));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_rate_control_stepping() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        let start = sim.state.sim_time;

        sim.toggle_pause(&tcp("2J"));
        tokio::time::advance(Duration::from_secs(5)).await;
        sim.update();
        assert_eq!(sim.state.sim_time, start);
        assert!(sim.idle_time() >= Duration::from_secs(5));

        // Resuming must not catch up on the paused time.
        sim.toggle_pause(&tcp("2J"));
        sim.set_sim_rate(&tcp("2J"), 2.0).unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;
        sim.update();
        assert_eq!(sim.state.sim_time, start + TimeDelta::seconds(3));

        let msgs = events_of(&mut sim, "2J", EventType::GlobalMessage);
        assert_eq!(msgs[0].message, "2J has paused the sim");
        assert_eq!(msgs[1].message, "2J has unpaused the sim");
    }

    #[test]
    fn sim_rate_must_be_positive() {
        let mut sim = test_sim();
        assert_eq!(sim.set_sim_rate(&tcp("2J"), 0.0), Err(SimError::UnableCommand));
        assert_eq!(
            sim.set_sim_rate(&tcp("2J"), f32::NAN),
            Err(SimError::UnableCommand)
        );
        assert!((sim.state.sim_rate - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn handoff_to_automation_accepts_only_after_deadline() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        add_aircraft(&mut sim, "DAL7", Some("2J"), Some("2J"));
        let deadline = sim.state.sim_time + TimeDelta::seconds(4);
        sim.state.aircraft.get_mut("DAL7").unwrap().handoff_track_controller = Some(tcp("N4P"));
        sim.handoffs.insert(
            Callsign::from("DAL7"),
            Handoff {
                auto_accept_time: deadline,
                receiving_facility: String::new(),
            },
        );

        sim.state.sim_time = deadline;
        sim.update_state();
        assert_eq!(
            sim.state.aircraft["DAL7"].tracking_controller,
            Some(tcp("2J"))
        );

        sim.state.sim_time = deadline + TimeDelta::seconds(1);
        sim.update_state();
        let ac = &sim.state.aircraft["DAL7"];
        assert_eq!(ac.tracking_controller, Some(tcp("N4P")));
        assert!(ac.handoff_track_controller.is_none());
        assert!(sim.handoffs.is_empty());

        let accepted = events_of(&mut sim, "2J", EventType::AcceptedHandoff);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].from_controller, Some(tcp("2J")));
        assert_eq!(accepted[0].to_controller, Some(tcp("N4P")));
    }

    #[test]
    fn handoff_to_human_is_left_for_the_human() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        sim.sign_on(&tcp("4P"), false).unwrap();
        add_aircraft(&mut sim, "DAL8", Some("2J"), Some("2J"));
        sim.offer_handoff(&Callsign::from("DAL8"), Some(tcp("2J")), tcp("4P"));

        sim.state.sim_time += TimeDelta::seconds(60);
        sim.update_state();
        let ac = &sim.state.aircraft["DAL8"];
        assert_eq!(ac.tracking_controller, Some(tcp("2J")));
        assert_eq!(ac.handoff_track_controller, Some(tcp("4P")));
        assert!(sim.handoffs.is_empty());
    }

    #[test]
    fn point_out_acknowledgement_swaps_from_and_to() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        add_aircraft(&mut sim, "UAL3", Some("2J"), Some("2J"));
        sim.start_point_out(&Callsign::from("UAL3"), tcp("2J"), tcp("N4P"));

        sim.state.sim_time += TimeDelta::seconds(30);
        sim.update_state();
        assert!(sim.point_outs.is_empty());

        let acks = events_of(&mut sim, "2J", EventType::AcknowledgedPointOut);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].from_controller, Some(tcp("N4P")));
        assert_eq!(acks[0].to_controller, Some(tcp("2J")));
    }

    #[test]
    fn handoff_and_point_out_both_resolve_in_one_tick() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        add_aircraft(&mut sim, "JBU1", Some("2J"), Some("2J"));
        let cs = Callsign::from("JBU1");
        sim.offer_handoff(&cs, Some(tcp("2J")), tcp("N4P"));
        sim.start_point_out(&cs, tcp("2J"), tcp("JFK_TWR"));

        sim.state.sim_time += TimeDelta::seconds(30);
        sim.update_state();

        assert!(sim.handoffs.is_empty());
        assert!(sim.point_outs.is_empty());
        assert_eq!(
            sim.state.aircraft["JBU1"].tracking_controller,
            Some(tcp("N4P"))
        );
        let kinds: Vec<EventType> = sim
            .get_world_update(&tcp("2J"))
            .events
            .into_iter()
            .map(|e| e.event_type)
            .filter(|k| {
                matches!(
                    k,
                    EventType::AcceptedHandoff | EventType::AcknowledgedPointOut
                )
            })
            .collect();
        assert_eq!(
            kinds,
            [EventType::AcceptedHandoff, EventType::AcknowledgedPointOut]
        );
    }

    #[test]
    fn prespawn_accepts_handoffs_immediately() {
        let mut sim = test_sim();
        add_aircraft(&mut sim, "AAL9", Some("2J"), Some("2J"));
        sim.offer_handoff(&Callsign::from("AAL9"), Some(tcp("2J")), tcp("N4P"));
        sim.prespawn = true;
        sim.update_state();
        assert_eq!(
            sim.state.aircraft["AAL9"].tracking_controller,
            Some(tcp("N4P"))
        );
    }

    #[test]
    fn restriction_areas_use_one_based_indices() {
        let mut sim = test_sim();
        let ra = RestrictionArea {
            title: "TFR".to_owned(),
            ..RestrictionArea::default()
        };
        assert_eq!(sim.create_restriction_area(ra.clone()).unwrap(), 1);
        assert_eq!(sim.create_restriction_area(ra.clone()).unwrap(), 2);

        sim.update_restriction_area(2, ra.clone()).unwrap();
        sim.delete_restriction_area(1).unwrap();
        assert_eq!(
            sim.delete_restriction_area(1),
            Err(SimError::InvalidRestrictionAreaIndex)
        );
        assert_eq!(
            sim.update_restriction_area(0, ra.clone()),
            Err(SimError::InvalidRestrictionAreaIndex)
        );
        assert_eq!(
            sim.update_restriction_area(3, ra),
            Err(SimError::InvalidRestrictionAreaIndex)
        );
        assert_eq!(sim.state.user_restriction_areas.len(), 2);
    }

    #[test]
    fn restriction_areas_reuse_deleted_slots_when_full() {
        let mut sim = test_sim();
        for _ in 0..MAX_RESTRICTION_AREAS {
            sim.create_restriction_area(RestrictionArea::default()).unwrap();
        }
        assert_eq!(
            sim.create_restriction_area(RestrictionArea::default()),
            Err(SimError::TooManyRestrictionAreas)
        );
        sim.delete_restriction_area(7).unwrap();
        assert_eq!(
            sim.create_restriction_area(RestrictionArea::default()).unwrap(),
            7
        );
    }

    #[test]
    fn world_update_is_an_owned_copy() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        add_aircraft(&mut sim, "AAL5", None, None);
        let mut wu = sim.get_world_update(&tcp("2J"));
        wu.aircraft.clear();
        assert!(sim.state.aircraft.contains_key("AAL5"));
        assert_eq!(wu.human_controllers, vec![tcp("2J")]);
        assert!(sim.get_world_update(&tcp("2J")).events.is_empty());
    }

    #[test]
    fn snapshot_drops_humans_and_restores_cids() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        add_aircraft(&mut sim, "AAL6", Some("2J"), Some("2J"));
        let cid = sim.cids.allocate(&mut sim.rng).unwrap();
        sim.state.aircraft.get_mut("AAL6").unwrap().flight_plan.cid = Some(cid.clone());

        let snap = sim.serialize_snapshot();
        assert!(snap.state.human_controllers.is_empty());
        assert!(!snap.state.controllers.contains_key("2J"));
        assert!(snap.state.controllers.contains_key("N4P"));

        let json = serde_json::to_string(&snap).unwrap();
        let back: SimSnapshot = serde_json::from_str(&json).unwrap();
        let mut restored = Sim::from_snapshot(back, &SimulationSettings::default());
        assert!(restored.cids.is_allocated(&cid));
        assert!(restored.state.aircraft.contains_key("AAL6"));
        restored.sign_on(&tcp("2J"), false).unwrap();
    }

    #[test]
    fn landing_low_enough_deletes_and_releases_cid() {
        let mut sim = test_sim();
        add_aircraft(&mut sim, "AAL10", None, None);
        let cid = sim.cids.allocate(&mut sim.rng).unwrap();
        sim.state.aircraft.get_mut("AAL10").unwrap().flight_plan.cid = Some(cid.clone());
        let wp = Waypoint {
            fix: "_22L".to_owned(),
            land: true,
            altitude_restriction: Some(AltitudeRestriction::at(100.0)),
            ..Waypoint::default()
        };
        sim.state.aircraft.get_mut("AAL10").unwrap().nav.altitude = 200.0;

        assert!(!sim.apply_waypoint(&Callsign::from("AAL10"), &wp));
        assert!(!sim.state.aircraft.contains_key("AAL10"));
        assert!(!sim.cids.is_allocated(&cid));
    }

    #[test]
    fn landing_too_high_goes_around_to_departure() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        add_aircraft(&mut sim, "AAL11", Some("2J"), Some("2J"));
        {
            let ac = sim.state.aircraft.get_mut("AAL11").unwrap();
            ac.nav.altitude = 1200.0;
            ac.flight_plan.arrival_airport = "KJFK".to_owned();
            ac.approach_controller = Some(tcp("2J"));
        }
        let wp = Waypoint {
            fix: "_22L".to_owned(),
            land: true,
            altitude_restriction: Some(AltitudeRestriction::at(100.0)),
            ..Waypoint::default()
        };

        assert!(sim.apply_waypoint(&Callsign::from("AAL11"), &wp));
        let ac = &sim.state.aircraft["AAL11"];
        assert_eq!(ac.nav.assigned_altitude, Some(4000.0));
        // 4P is not staffed, so the split resolves it to the primary.
        assert_eq!(ac.controlling_controller, Some(tcp("2J")));
        // Tracking is the approach controller: no handoff is offered.
        assert!(ac.handoff_track_controller.is_none());
        let radio = events_of(&mut sim, "2J", EventType::RadioTransmission);
        assert!(radio[0].message.starts_with("going around"));
    }

    #[test]
    fn waypoint_point_out_short_circuits() {
        let mut sim = test_sim();
        add_aircraft(&mut sim, "AAL12", Some("N4P"), Some("N4P"));
        let wp = Waypoint {
            fix: "CAMRN".to_owned(),
            point_out: Some(tcp("JFK_TWR")),
            delete: true,
            ..Waypoint::default()
        };
        assert!(!sim.apply_waypoint(&Callsign::from("AAL12"), &wp));
        assert!(sim.state.aircraft.contains_key("AAL12"));
        assert_eq!(sim.point_outs["AAL12"].from, tcp("N4P"));
    }

    #[test]
    fn departure_checks_in_at_contact_altitude() {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        sim.sign_on(&tcp("4P"), false).unwrap();
        add_aircraft(&mut sim, "JBU20", None, Some("JFK_TWR"));
        {
            let ac = sim.state.aircraft.get_mut("JBU20").unwrap();
            ac.flight_plan.departure_airport = "KJFK".to_owned();
            ac.departure_contact_altitude = Some(1500.0);
            ac.departure_contact_controller = Some(tcp("4P"));
            ac.nav.altitude = 1600.0;
            ac.nav.assigned_altitude = Some(5000.0);
        }
        sim.check_departure_contact(&Callsign::from("JBU20"));
        let ac = &sim.state.aircraft["JBU20"];
        assert_eq!(ac.controlling_controller, Some(tcp("4P")));
        assert!(ac.departure_contact_altitude.is_none());
        let radio = events_of(&mut sim, "4P", EventType::RadioTransmission);
        assert_eq!(radio[0].message, "departing Kennedy, passing 1,600 for 5,000");
    }

    #[test]
    fn far_away_aircraft_are_culled() {
        let mut sim = test_sim();
        add_aircraft(&mut sim, "AAL13", None, None);
        sim.state.aircraft.get_mut("AAL13").unwrap().nav.position = Point2LL::new(-60.0, 40.0);
        sim.step_aircraft(&Callsign::from("AAL13"));
        assert!(!sim.state.aircraft.contains_key("AAL13"));
    }

    #[test]
    fn held_and_waiting_aircraft_do_not_move() {
        let mut sim = test_sim();
        add_aircraft(&mut sim, "AAL14", None, None);
        let ac: &mut Aircraft = sim.state.aircraft.get_mut("AAL14").unwrap();
        ac.hold_for_release = true;
        let before = ac.nav.position;
        sim.step_aircraft(&Callsign::from("AAL14"));
        assert_eq!(sim.state.aircraft["AAL14"].nav.position, before);
    }

    #[test]
    fn available_positions_exclude_humans() {
        let mut sim = test_sim();
        sim.state.launch_config.mode = LaunchMode::Manual;
        sim.sign_on(&tcp("2J"), false).unwrap();
        let (available, covered) = sim.available_covered_positions();
        assert!(available.contains_key("4P"));
        assert!(!available.contains_key("2J"));
        assert!(covered.contains_key("2J"));
    }
}
