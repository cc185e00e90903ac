//! Track ownership and datablock operations.
//!
//! Handoffs and point-outs are the coordination protocol between
//! positions. Offers to automated positions are resolved by the update
//! loop once their accept time passes; offers to humans wait for an
//! explicit accept, acknowledge, or reject.

use tracing::info;
use tracon_types::{
    Aircraft, Callsign, Event, EventType, LaunchConfig, LeaderLineDirection, RedirectedHandoff,
    Tcp, TransponderMode,
};

use crate::error::SimError;
use crate::sim::Sim;

/// Scratchpads hold at most this many characters.
const MAX_SCRATCHPAD_CHARS: usize = 4;

/// Seconds before an aircraft whose handoff was accepted checks in.
const HANDOFF_CONTACT_DELAY_SECS: i64 = 2;

/// Smallest non-zero launch rate multiplier.
pub const MIN_RATE_SCALE: f32 = 0.01;

/// Largest launch rate multiplier.
pub const MAX_RATE_SCALE: f32 = 100.0;

/// Zero switches a source off; anything else must be a sane multiplier.
fn valid_rate_scale(scale: f32) -> bool {
    scale == 0.0 || (MIN_RATE_SCALE..=MAX_RATE_SCALE).contains(&scale)
}

impl Sim {
    pub(crate) fn aircraft(&self, cs: &Callsign) -> Result<&Aircraft, SimError> {
        self.state
            .aircraft
            .get(cs)
            .ok_or(SimError::NoAircraftForCallsign)
    }

    pub(crate) fn aircraft_mut(&mut self, cs: &Callsign) -> Result<&mut Aircraft, SimError> {
        self.state
            .aircraft
            .get_mut(cs)
            .ok_or(SimError::NoAircraftForCallsign)
    }

    /// The aircraft, if `tcp` tracks it (instructors may act on any track).
    fn tracked_by(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<&mut Aircraft, SimError> {
        let instructor = self.is_instructor(tcp);
        let ac = self.aircraft_mut(cs)?;
        if ac.is_tracked_by(tcp) || instructor {
            Ok(ac)
        } else {
            Err(SimError::OtherControllerHasTrack)
        }
    }

    fn check_receiver(&self, tcp: &Tcp, to: &Tcp) -> Result<(), SimError> {
        if !self.state.controllers.contains_key(to) {
            return Err(SimError::NoController);
        }
        if to == tcp {
            return Err(SimError::InvalidController);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tracks
    // -----------------------------------------------------------------------

    /// Start tracking an untracked aircraft.
    pub fn initiate_track(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let ac = self.aircraft_mut(cs)?;
        if ac.tracking_controller.is_some() {
            return Err(SimError::TrackIsActive);
        }
        ac.tracking_controller = Some(tcp.clone());
        if ac.controlling_controller.is_none() {
            ac.controlling_controller = Some(tcp.clone());
        }

        self.post_event(Event::coordination(
            EventType::InitiatedTrack,
            cs.clone(),
            Some(tcp.clone()),
            None,
        ));
        info!(callsign = %cs, tcp = %tcp, "Initiated track");
        Ok(())
    }

    /// Stop tracking; any outstanding handoff is withdrawn.
    pub fn drop_track(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let ac = self.aircraft_mut(cs)?;
        match &ac.tracking_controller {
            None => return Err(SimError::TrackIsNotActive),
            Some(t) if t != tcp => return Err(SimError::OtherControllerHasTrack),
            Some(_) => {}
        }
        ac.tracking_controller = None;
        ac.handoff_track_controller = None;
        ac.redirected_handoff = None;
        self.handoffs.remove(cs);

        self.post_event(Event::coordination(
            EventType::DroppedTrack,
            cs.clone(),
            Some(tcp.clone()),
            None,
        ));
        info!(callsign = %cs, tcp = %tcp, "Dropped track");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Handoffs
    // -----------------------------------------------------------------------

    /// Offer the track to `to`.
    pub fn handoff_track(&mut self, tcp: &Tcp, cs: &Callsign, to: &Tcp) -> Result<(), SimError> {
        self.check_receiver(tcp, to)?;
        let ac = self.tracked_by(tcp, cs)?;
        if ac.handoff_track_controller.is_some() {
            return Err(SimError::TrackIsBeingHandedOff);
        }
        let from = ac.tracking_controller.clone();

        self.offer_handoff(cs, from, to.clone());
        info!(callsign = %cs, from = %tcp, to = %to, "Handoff offered");
        Ok(())
    }

    /// Take a track that was offered to `tcp`.
    ///
    /// If no human is talking to the aircraft, it checks in with `tcp`
    /// shortly afterwards.
    pub fn accept_handoff(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let ac = self.aircraft(cs)?;
        if ac.handoff_track_controller.as_ref() != Some(tcp) {
            return Err(SimError::NotBeingHandedOffToMe);
        }
        let from = ac.tracking_controller.clone();
        let human_controlled = ac
            .controlling_controller
            .as_ref()
            .is_some_and(|c| self.is_active_human(c));

        self.post_event(Event::coordination(
            EventType::AcceptedHandoff,
            cs.clone(),
            from,
            Some(tcp.clone()),
        ));
        self.handoffs.remove(cs);
        let ac = self.aircraft_mut(cs)?;
        ac.tracking_controller = Some(tcp.clone());
        ac.handoff_track_controller = None;
        ac.redirected_handoff = None;

        if !human_controlled {
            self.enqueue_controller_contact(cs, tcp.clone(), HANDOFF_CONTACT_DELAY_SECS);
        }
        info!(callsign = %cs, tcp = %tcp, "Handoff accepted");
        Ok(())
    }

    /// Withdraw an outstanding offer.
    pub fn cancel_handoff(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let ac = self.tracked_by(tcp, cs)?;
        let to = ac.handoff_track_controller.take();
        ac.redirected_handoff = None;
        self.handoffs.remove(cs);

        if to.is_some() {
            self.post_event(Event::coordination(
                EventType::CanceledHandoff,
                cs.clone(),
                Some(tcp.clone()),
                to,
            ));
        }
        Ok(())
    }

    /// Pass an offer made to `tcp` on to another position.
    pub fn redirect_handoff(&mut self, tcp: &Tcp, cs: &Callsign, to: &Tcp) -> Result<(), SimError> {
        self.check_receiver(tcp, to)?;
        let ac = self.aircraft_mut(cs)?;
        let offered_to_me = ac.handoff_track_controller.as_ref() == Some(tcp)
            || ac
                .redirected_handoff
                .as_ref()
                .is_some_and(|rd| rd.redirect_to == *tcp);
        if !offered_to_me {
            return Err(SimError::NotBeingHandedOffToMe);
        }
        if ac.tracking_controller.as_ref() == Some(to) {
            return Err(SimError::InvalidController);
        }
        ac.redirected_handoff = Some(RedirectedHandoff {
            redirector: tcp.clone(),
            redirect_to: to.clone(),
        });

        self.post_event(Event::coordination(
            EventType::RedirectedHandoff,
            cs.clone(),
            Some(tcp.clone()),
            Some(to.clone()),
        ));
        info!(callsign = %cs, by = %tcp, to = %to, "Handoff redirected");
        Ok(())
    }

    /// Take a redirected track. The redirector may also take it back.
    pub fn accept_redirected_handoff(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let ac = self.aircraft_mut(cs)?;
        let Some(rd) = ac.redirected_handoff.clone() else {
            return Err(SimError::NotBeingHandedOffToMe);
        };
        if rd.redirect_to != *tcp && rd.redirector != *tcp {
            return Err(SimError::NotBeingHandedOffToMe);
        }
        ac.tracking_controller = Some(tcp.clone());
        ac.handoff_track_controller = None;
        ac.redirected_handoff = None;
        self.handoffs.remove(cs);

        self.post_event(Event::coordination(
            EventType::AcceptedRedirectedHandoff,
            cs.clone(),
            Some(rd.redirector),
            Some(tcp.clone()),
        ));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Point-outs
    // -----------------------------------------------------------------------

    /// Point the aircraft out to `to`. One point-out at a time.
    pub fn point_out(&mut self, tcp: &Tcp, cs: &Callsign, to: &Tcp) -> Result<(), SimError> {
        self.check_receiver(tcp, to)?;
        self.tracked_by(tcp, cs)?;
        if self.point_outs.contains_key(cs) {
            return Err(SimError::TrackIsPointedOut);
        }
        self.start_point_out(cs, tcp.clone(), to.clone());
        info!(callsign = %cs, from = %tcp, to = %to, "Point out");
        Ok(())
    }

    fn take_point_out(
        &mut self,
        cs: &Callsign,
        is_party: impl Fn(&crate::sim::PointOut) -> bool,
    ) -> Result<crate::sim::PointOut, SimError> {
        self.aircraft(cs)?;
        if !self.point_outs.get(cs).is_some_and(is_party) {
            return Err(SimError::NotPointedOutToMe);
        }
        self.point_outs.remove(cs).ok_or(SimError::NotPointedOutToMe)
    }

    /// Acknowledge a point-out made to `tcp`.
    pub fn acknowledge_point_out(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let po = self.take_point_out(cs, |po| po.to == *tcp)?;
        self.post_event(Event::coordination(
            EventType::AcknowledgedPointOut,
            cs.clone(),
            Some(tcp.clone()),
            Some(po.from),
        ));
        Ok(())
    }

    /// Withdraw a point-out `tcp` made.
    pub fn recall_point_out(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let po = self.take_point_out(cs, |po| po.from == *tcp)?;
        self.post_event(Event::coordination(
            EventType::RecalledPointOut,
            cs.clone(),
            Some(tcp.clone()),
            Some(po.to),
        ));
        Ok(())
    }

    /// Refuse a point-out made to `tcp`.
    pub fn reject_point_out(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let po = self.take_point_out(cs, |po| po.to == *tcp)?;
        self.post_event(Event::coordination(
            EventType::RejectedPointOut,
            cs.clone(),
            Some(tcp.clone()),
            Some(po.from),
        ));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Datablock
    // -----------------------------------------------------------------------

    /// Force a quick-look datablock on `to`'s scope.
    pub fn force_ql(&mut self, tcp: &Tcp, cs: &Callsign, to: &Tcp) -> Result<(), SimError> {
        if !self.state.controllers.contains_key(to) {
            return Err(SimError::NoController);
        }
        let ac = self.aircraft_mut(cs)?;
        if !ac.force_ql_controllers.contains(to) {
            ac.force_ql_controllers.push(to.clone());
        }
        self.post_event(Event::coordination(
            EventType::ForceQL,
            cs.clone(),
            Some(tcp.clone()),
            Some(to.clone()),
        ));
        Ok(())
    }

    /// Set the primary scratchpad.
    pub fn set_scratchpad(&mut self, tcp: &Tcp, cs: &Callsign, text: &str) -> Result<(), SimError> {
        check_scratchpad(text)?;
        self.tracked_by(tcp, cs)?.scratchpad = text.to_owned();
        Ok(())
    }

    /// Set the secondary scratchpad.
    pub fn set_secondary_scratchpad(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        text: &str,
    ) -> Result<(), SimError> {
        check_scratchpad(text)?;
        self.tracked_by(tcp, cs)?.secondary_scratchpad = text.to_owned();
        Ok(())
    }

    /// Set (or with `None`, clear) the leader line shown on every scope.
    pub fn set_global_leader_line(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        direction: Option<LeaderLineDirection>,
    ) -> Result<(), SimError> {
        self.tracked_by(tcp, cs)?.global_leader_line = direction;
        self.post_event(Event {
            callsign: Some(cs.clone()),
            from_controller: Some(tcp.clone()),
            leader_line_direction: direction,
            ..Event::new(EventType::SetGlobalLeaderLine)
        });
        Ok(())
    }

    /// Show `spc` in the datablock, or remove it if it is already shown.
    pub fn toggle_spc_override(&mut self, tcp: &Tcp, cs: &Callsign, spc: &str) -> Result<(), SimError> {
        let ac = self.tracked_by(tcp, cs)?;
        if ac.spc_override.as_deref() == Some(spc) {
            ac.spc_override = None;
        } else {
            ac.spc_override = Some(spc.to_owned());
        }
        Ok(())
    }

    /// Let a held departure take off.
    pub fn release_departure(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let ac = self.aircraft_mut(cs)?;
        if ac.released {
            return Err(SimError::AircraftAlreadyReleased);
        }
        ac.released = true;
        info!(callsign = %cs, tcp = %tcp, "Departure released");
        Ok(())
    }

    /// Set the interim altitude shown in the datablock; 0 clears it.
    pub fn set_temporary_altitude(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        altitude: i32,
    ) -> Result<(), SimError> {
        self.tracked_by(tcp, cs)?.temporary_altitude = (altitude != 0).then_some(altitude);
        Ok(())
    }

    /// Enter a pilot-reported altitude for an aircraft without mode C; 0
    /// clears it.
    pub fn set_pilot_reported_altitude(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        altitude: i32,
    ) -> Result<(), SimError> {
        let ac = self.tracked_by(tcp, cs)?;
        if ac.mode == TransponderMode::Altitude {
            return Err(SimError::UnableCommand);
        }
        ac.pilot_reported_altitude = (altitude != 0).then_some(altitude);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Launch control
    // -----------------------------------------------------------------------

    fn check_launch_control(&self, tcp: &Tcp) -> Result<(), SimError> {
        match &self.state.launch_config.controller {
            Some(holder) if holder != tcp => Err(SimError::NotLaunchController),
            _ => Ok(()),
        }
    }

    /// Take launch control if nobody holds it; give it up if `tcp` does.
    pub fn take_or_return_launch_control(&mut self, tcp: &Tcp) -> Result<(), SimError> {
        self.check_launch_control(tcp)?;
        let message = if self.state.launch_config.controller.take().is_some() {
            format!("{tcp} is no longer controlling aircraft launches.")
        } else {
            self.state.launch_config.controller = Some(tcp.clone());
            format!("{tcp} is now controlling aircraft launches.")
        };
        info!(tcp = %tcp, "{message}");
        self.post_event(Event::status(message));
        Ok(())
    }

    /// Replace the launch settings. Spawn schedules restart under the new
    /// rates; the launch controller is unchanged.
    ///
    /// Rate scales must lie in `0..=MAX_RATE_SCALE`, and scales that are
    /// positive must be at least `MIN_RATE_SCALE`. The go-around rate is a
    /// probability.
    pub fn set_launch_config(&mut self, tcp: &Tcp, mut config: LaunchConfig) -> Result<(), SimError> {
        self.check_launch_control(tcp)?;
        let scales = [
            config.departure_rate_scale,
            config.vfr_departure_rate_scale,
            config.inbound_flow_rate_scale,
        ];
        if !scales.into_iter().all(valid_rate_scale)
            || !(0.0..=1.0).contains(&config.go_around_rate)
        {
            return Err(SimError::InvalidArgument);
        }
        config.controller = self.state.launch_config.controller.clone();
        self.state.launch_config = config;
        self.reset_spawn_schedules();
        info!(tcp = %tcp, "Launch config updated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Remove an aircraft. Unknown callsigns are ignored.
    pub fn delete_aircraft(&mut self, tcp: &Tcp, cs: &Callsign) {
        if self.delete_aircraft_internal(cs) {
            self.post_event(Event::status(format!("{tcp} deleted {cs}")));
            info!(callsign = %cs, tcp = %tcp, "Aircraft deleted");
        }
    }

    /// Remove every aircraft and restart the spawn schedules.
    pub fn delete_all_aircraft(&mut self, tcp: &Tcp) -> Result<(), SimError> {
        self.check_launch_control(tcp)?;
        let callsigns: Vec<Callsign> = self.state.aircraft.keys().cloned().collect();
        for cs in &callsigns {
            self.delete_aircraft_internal(cs);
        }
        self.reset_spawn_schedules();
        info!(tcp = %tcp, count = callsigns.len(), "All aircraft deleted");
        Ok(())
    }
}

fn check_scratchpad(text: &str) -> Result<(), SimError> {
    if text.chars().count() > MAX_SCRATCHPAD_CHARS {
        Err(SimError::IllegalScratchpad)
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::testing::{add_aircraft, tcp, test_sim};

    fn cs(s: &str) -> Callsign {
        Callsign::from(s)
    }

    fn signed_on() -> Sim {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        sim.sign_on(&tcp("4P"), false).unwrap();
        sim
    }

    #[test]
    fn initiate_and_drop() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL1", None, None);
        sim.initiate_track(&tcp("2J"), &cs("AAL1")).unwrap();
        assert_eq!(
            sim.initiate_track(&tcp("4P"), &cs("AAL1")),
            Err(SimError::TrackIsActive)
        );
        assert_eq!(
            sim.drop_track(&tcp("4P"), &cs("AAL1")),
            Err(SimError::OtherControllerHasTrack)
        );
        sim.drop_track(&tcp("2J"), &cs("AAL1")).unwrap();
        assert_eq!(
            sim.drop_track(&tcp("2J"), &cs("AAL1")),
            Err(SimError::TrackIsNotActive)
        );
        assert_eq!(
            sim.initiate_track(&tcp("2J"), &cs("NOPE")),
            Err(SimError::NoAircraftForCallsign)
        );
    }

    #[test]
    fn handoff_validation() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL2", Some("2J"), Some("2J"));
        assert_eq!(
            sim.handoff_track(&tcp("4P"), &cs("AAL2"), &tcp("2J")),
            Err(SimError::OtherControllerHasTrack)
        );
        assert_eq!(
            sim.handoff_track(&tcp("2J"), &cs("AAL2"), &tcp("XX")),
            Err(SimError::NoController)
        );
        assert_eq!(
            sim.handoff_track(&tcp("2J"), &cs("AAL2"), &tcp("2J")),
            Err(SimError::InvalidController)
        );
        sim.handoff_track(&tcp("2J"), &cs("AAL2"), &tcp("4P")).unwrap();
        assert_eq!(
            sim.handoff_track(&tcp("2J"), &cs("AAL2"), &tcp("N4P")),
            Err(SimError::TrackIsBeingHandedOff)
        );
        assert!(sim.handoffs.contains_key("AAL2"));
    }

    #[test]
    fn human_accept_schedules_contact_when_automation_is_talking() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL3", Some("2J"), Some("N4P"));
        sim.handoff_track(&tcp("2J"), &cs("AAL3"), &tcp("4P")).unwrap();
        assert_eq!(
            sim.accept_handoff(&tcp("2J"), &cs("AAL3")),
            Err(SimError::NotBeingHandedOffToMe)
        );
        sim.accept_handoff(&tcp("4P"), &cs("AAL3")).unwrap();

        let ac = &sim.state.aircraft["AAL3"];
        assert_eq!(ac.tracking_controller, Some(tcp("4P")));
        assert!(sim.handoffs.is_empty());
        assert_eq!(sim.future_contacts.len(), 1);
        assert_eq!(sim.future_contacts[0].tcp, tcp("4P"));

        sim.state.sim_time += TimeDelta::seconds(HANDOFF_CONTACT_DELAY_SECS);
        sim.process_enqueued();
        assert_eq!(
            sim.state.aircraft["AAL3"].controlling_controller,
            Some(tcp("4P"))
        );
    }

    #[test]
    fn cancel_clears_offer() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL4", Some("2J"), Some("2J"));
        sim.handoff_track(&tcp("2J"), &cs("AAL4"), &tcp("4P")).unwrap();
        sim.cancel_handoff(&tcp("2J"), &cs("AAL4")).unwrap();
        assert!(sim.state.aircraft["AAL4"].handoff_track_controller.is_none());
        assert!(sim.handoffs.is_empty());
    }

    #[test]
    fn redirect_then_accept() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL5", Some("N4P"), Some("N4P"));
        sim.handoff_track(&tcp("N4P"), &cs("AAL5"), &tcp("2J")).unwrap();
        assert_eq!(
            sim.redirect_handoff(&tcp("4P"), &cs("AAL5"), &tcp("2J")),
            Err(SimError::NotBeingHandedOffToMe)
        );
        sim.redirect_handoff(&tcp("2J"), &cs("AAL5"), &tcp("4P")).unwrap();
        assert_eq!(
            sim.accept_redirected_handoff(&tcp("JFK_TWR"), &cs("AAL5")),
            Err(SimError::NotBeingHandedOffToMe)
        );
        sim.accept_redirected_handoff(&tcp("4P"), &cs("AAL5")).unwrap();
        let ac = &sim.state.aircraft["AAL5"];
        assert_eq!(ac.tracking_controller, Some(tcp("4P")));
        assert!(ac.redirected_handoff.is_none());
        assert!(sim.handoffs.is_empty());
    }

    #[test]
    fn one_point_out_at_a_time() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL6", Some("2J"), Some("2J"));
        sim.point_out(&tcp("2J"), &cs("AAL6"), &tcp("4P")).unwrap();
        assert_eq!(
            sim.point_out(&tcp("2J"), &cs("AAL6"), &tcp("N4P")),
            Err(SimError::TrackIsPointedOut)
        );
        assert_eq!(
            sim.acknowledge_point_out(&tcp("2J"), &cs("AAL6")),
            Err(SimError::NotPointedOutToMe)
        );
        sim.reject_point_out(&tcp("4P"), &cs("AAL6")).unwrap();
        assert!(sim.point_outs.is_empty());

        sim.point_out(&tcp("2J"), &cs("AAL6"), &tcp("4P")).unwrap();
        sim.recall_point_out(&tcp("2J"), &cs("AAL6")).unwrap();
        assert!(sim.point_outs.is_empty());
    }

    #[test]
    fn human_acknowledge_swaps_direction() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL7", Some("2J"), Some("2J"));
        sim.point_out(&tcp("2J"), &cs("AAL7"), &tcp("4P")).unwrap();
        sim.acknowledge_point_out(&tcp("4P"), &cs("AAL7")).unwrap();
        let ack = sim
            .get_world_update(&tcp("2J"))
            .events
            .into_iter()
            .find(|e| e.event_type == EventType::AcknowledgedPointOut)
            .unwrap();
        assert_eq!(ack.from_controller, Some(tcp("4P")));
        assert_eq!(ack.to_controller, Some(tcp("2J")));
    }

    #[test]
    fn scratchpads_are_limited() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL8", Some("2J"), Some("2J"));
        sim.set_scratchpad(&tcp("2J"), &cs("AAL8"), "CAM").unwrap();
        assert_eq!(
            sim.set_scratchpad(&tcp("2J"), &cs("AAL8"), "CAMRN"),
            Err(SimError::IllegalScratchpad)
        );
        sim.set_secondary_scratchpad(&tcp("2J"), &cs("AAL8"), "B7").unwrap();
        let ac = &sim.state.aircraft["AAL8"];
        assert_eq!(ac.scratchpad, "CAM");
        assert_eq!(ac.secondary_scratchpad, "B7");
    }

    #[test]
    fn spc_override_toggles() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL9", Some("2J"), Some("2J"));
        sim.toggle_spc_override(&tcp("2J"), &cs("AAL9"), "RDOF").unwrap();
        assert_eq!(sim.state.aircraft["AAL9"].spc_override.as_deref(), Some("RDOF"));
        sim.toggle_spc_override(&tcp("2J"), &cs("AAL9"), "RDOF").unwrap();
        assert!(sim.state.aircraft["AAL9"].spc_override.is_none());
    }

    #[test]
    fn release_only_once() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL10", None, None);
        sim.state.aircraft.get_mut("AAL10").unwrap().hold_for_release = true;
        sim.release_departure(&tcp("2J"), &cs("AAL10")).unwrap();
        assert_eq!(
            sim.release_departure(&tcp("2J"), &cs("AAL10")),
            Err(SimError::AircraftAlreadyReleased)
        );
    }

    #[test]
    fn pilot_reported_altitude_needs_non_mode_c() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL11", Some("2J"), Some("2J"));
        assert_eq!(
            sim.set_pilot_reported_altitude(&tcp("2J"), &cs("AAL11"), 5000),
            Err(SimError::UnableCommand)
        );
        sim.state.aircraft.get_mut("AAL11").unwrap().mode = TransponderMode::On;
        sim.set_pilot_reported_altitude(&tcp("2J"), &cs("AAL11"), 5000)
            .unwrap();
        sim.set_temporary_altitude(&tcp("2J"), &cs("AAL11"), 7000)
            .unwrap();
        let ac = &sim.state.aircraft["AAL11"];
        assert_eq!(ac.pilot_reported_altitude, Some(5000));
        assert_eq!(ac.temporary_altitude, Some(7000));
    }

    #[test]
    fn launch_control_is_exclusive() {
        let mut sim = signed_on();
        sim.take_or_return_launch_control(&tcp("4P")).unwrap();
        assert_eq!(
            sim.take_or_return_launch_control(&tcp("2J")),
            Err(SimError::NotLaunchController)
        );
        assert_eq!(
            sim.set_launch_config(&tcp("2J"), LaunchConfig::default()),
            Err(SimError::NotLaunchController)
        );
        assert_eq!(
            sim.delete_all_aircraft(&tcp("2J")),
            Err(SimError::NotLaunchController)
        );

        sim.set_launch_config(&tcp("4P"), LaunchConfig::default()).unwrap();
        assert_eq!(sim.state.launch_config.controller, Some(tcp("4P")));

        sim.take_or_return_launch_control(&tcp("4P")).unwrap();
        assert!(sim.state.launch_config.controller.is_none());

        let status: Vec<String> = sim
            .get_world_update(&tcp("2J"))
            .events
            .into_iter()
            .filter(|e| e.event_type == EventType::StatusMessage)
            .map(|e| e.message)
            .collect();
        assert!(status.contains(&"4P is now controlling aircraft launches.".to_owned()));
        assert!(status.contains(&"4P is no longer controlling aircraft launches.".to_owned()));
    }

    #[test]
    fn launch_config_rejects_out_of_range_rates() {
        let mut sim = signed_on();
        let before = sim.state.launch_config.clone();
        for bad in [
            LaunchConfig {
                departure_rate_scale: 1e-12,
                ..LaunchConfig::default()
            },
            LaunchConfig {
                vfr_departure_rate_scale: f32::NAN,
                ..LaunchConfig::default()
            },
            LaunchConfig {
                inbound_flow_rate_scale: f32::INFINITY,
                ..LaunchConfig::default()
            },
            LaunchConfig {
                departure_rate_scale: -1.0,
                ..LaunchConfig::default()
            },
            LaunchConfig {
                go_around_rate: 1.5,
                ..LaunchConfig::default()
            },
        ] {
            assert_eq!(
                sim.set_launch_config(&tcp("2J"), bad),
                Err(SimError::InvalidArgument)
            );
        }
        assert_eq!(sim.state.launch_config, before);

        let off = LaunchConfig {
            departure_rate_scale: 0.0,
            inbound_flow_rate_scale: MAX_RATE_SCALE,
            ..LaunchConfig::default()
        };
        sim.set_launch_config(&tcp("2J"), off).unwrap();
        assert!(sim.state.launch_config.departure_rate_scale.abs() < f32::EPSILON);
    }

    #[test]
    fn delete_clears_pending_coordination() {
        let mut sim = signed_on();
        add_aircraft(&mut sim, "AAL12", Some("2J"), Some("2J"));
        add_aircraft(&mut sim, "AAL13", Some("2J"), Some("2J"));
        sim.handoff_track(&tcp("2J"), &cs("AAL12"), &tcp("4P")).unwrap();
        sim.point_out(&tcp("2J"), &cs("AAL12"), &tcp("N4P")).unwrap();

        sim.delete_aircraft(&tcp("2J"), &cs("AAL12"));
        assert!(sim.handoffs.is_empty());
        assert!(sim.point_outs.is_empty());
        // Unknown callsigns are not an error.
        sim.delete_aircraft(&tcp("2J"), &cs("AAL12"));

        sim.delete_all_aircraft(&tcp("2J")).unwrap();
        assert!(sim.state.aircraft.is_empty());
    }
}
