//! Clearances issued to aircraft by the position talking to them.
//!
//! Every operation here is validated against a copy of the aircraft and
//! only committed if it succeeds, so a rejected clearance leaves no trace.
//! The pilot's readback is posted as a radio transmission addressed to
//! the controlling position.

use tracing::debug;
use tracon_types::geo::normalize_heading;
use tracon_types::{
    Aircraft, AltitudeRestriction, Callsign, CrossFixRestriction, DepartFix, DepartFixAction,
    Event, EventType, RadioTransmission, Squawk, Tcp, TransponderMode, TurnMethod, Waypoint,
};

use crate::aircraft::format_altitude;
use crate::error::SimError;
use crate::sim::{Sim, offset_secs};
use crate::state::State;

/// How long an ident shows on the scope.
const IDENT_SECS: i64 = 10;

/// Delay before an aircraft told to contact another position checks in.
const HANDOFF_CONTROL_DELAY_SECS: i64 = 4;

/// A heading clearance: present heading, an absolute heading with a turn
/// direction, or a relative turn.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadingArgs {
    /// Fly present heading.
    pub present: bool,
    /// Absolute heading, 1..=360.
    pub heading: Option<f32>,
    /// Direction for an absolute heading.
    pub turn: TurnMethod,
    /// Turn this many degrees left.
    pub left_degrees: Option<f32>,
    /// Turn this many degrees right.
    pub right_degrees: Option<f32>,
}

fn format_heading(hdg: f32) -> String {
    format!("{:03.0}", hdg.round())
}

fn route_index(ac: &Aircraft, fix: &str) -> Option<usize> {
    ac.nav.waypoints.iter().position(|wp| wp.fix == fix)
}

fn approach_waypoints(state: &State, ac: &Aircraft, approach: &str) -> Option<Vec<Waypoint>> {
    let ap = state.airports.get(&ac.flight_plan.arrival_airport)?;
    let mut wps = ap.approaches.get(approach)?.waypoints.clone();
    state.resolve_waypoints(&mut wps);
    Some(wps)
}

fn approach_name(state: &State, ac: &Aircraft, approach: &str) -> String {
    state
        .airports
        .get(&ac.flight_plan.arrival_airport)
        .and_then(|ap| ap.approaches.get(approach))
        .map(|a| a.full_name.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| approach.to_owned())
}

impl Sim {
    /// Run `f` against a copy of the aircraft `tcp` is talking to and
    /// commit it if `f` succeeds. `f` returns the pilot's readback.
    fn dispatch_controlled<F>(&mut self, tcp: &Tcp, cs: &Callsign, f: F) -> Result<(), SimError>
    where
        F: FnOnce(&State, &mut Aircraft) -> Result<String, SimError>,
    {
        let ac = self.aircraft(cs)?;
        if !ac.is_controlled_by(tcp) && !self.is_instructor(tcp) {
            return Err(SimError::OtherControllerHasTrack);
        }
        let controller = ac.controlling_controller.clone();
        let mut updated = ac.clone();
        let readback = f(&self.state, &mut updated)?;
        self.state.aircraft.insert(cs.clone(), updated);

        debug!(callsign = %cs, tcp = %tcp, readback = %readback, "Clearance");
        self.post_radio_events(cs, vec![RadioTransmission::readback(controller, readback)]);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Altitude
    // -----------------------------------------------------------------------

    /// Climb or descend to `altitude` feet, immediately or once the
    /// assigned speed is reached.
    pub fn assign_altitude(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        altitude: f32,
        after_speed: bool,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            if !altitude.is_finite() || altitude <= 0.0 || altitude > ac.performance.ceiling {
                return Err(SimError::InvalidAltitude);
            }
            let verb = if (altitude - ac.nav.altitude).abs() < 100.0 {
                "maintain"
            } else if altitude > ac.nav.altitude {
                "climb and maintain"
            } else {
                "descend and maintain"
            };
            ac.nav.climb_via_sid = false;
            ac.nav.descend_via_star = false;
            ac.nav.expedite = false;

            if after_speed && ac.nav.assigned_speed.is_some() {
                ac.nav.deferred_altitude = Some(altitude);
                let speed = ac.nav.assigned_speed.unwrap_or_default();
                Ok(format!(
                    "at {speed:.0} knots {verb} {}",
                    format_altitude(altitude)
                ))
            } else {
                ac.nav.assigned_altitude = Some(altitude);
                ac.nav.deferred_altitude = None;
                Ok(format!("{verb} {}", format_altitude(altitude)))
            }
        })
    }

    /// Climb via the SID's altitude restrictions.
    pub fn climb_via_sid(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            if ac.nav.waypoints.is_empty() {
                return Err(SimError::UnableCommand);
            }
            ac.nav.assigned_altitude = None;
            ac.nav.deferred_altitude = None;
            ac.nav.descend_via_star = false;
            ac.nav.climb_via_sid = true;
            Ok("climb via the SID".to_owned())
        })
    }

    /// Descend via the STAR's altitude restrictions.
    pub fn descend_via_star(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            if ac.nav.waypoints.is_empty() {
                return Err(SimError::UnableCommand);
            }
            ac.nav.assigned_altitude = None;
            ac.nav.deferred_altitude = None;
            ac.nav.climb_via_sid = false;
            ac.nav.descend_via_star = true;
            Ok("descend via the STAR".to_owned())
        })
    }

    /// Expedite toward an assigned altitude above the aircraft.
    pub fn expedite_climb(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| match ac.nav.assigned_altitude {
            Some(alt) if alt > ac.nav.altitude => {
                ac.nav.expedite = true;
                Ok("expediting the climb".to_owned())
            }
            _ => Err(SimError::UnableCommand),
        })
    }

    /// Expedite toward an assigned altitude below the aircraft.
    pub fn expedite_descent(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| match ac.nav.assigned_altitude {
            Some(alt) if alt < ac.nav.altitude => {
                ac.nav.expedite = true;
                Ok("expediting the descent".to_owned())
            }
            _ => Err(SimError::UnableCommand),
        })
    }

    // -----------------------------------------------------------------------
    // Heading
    // -----------------------------------------------------------------------

    /// Assign a heading. Vectors cancel any approach clearance and pending
    /// depart-fix clearance.
    pub fn assign_heading(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        args: HeadingArgs,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            let (heading, turn, readback) = if args.present {
                let hdg = normalize_heading(ac.nav.heading);
                (hdg, TurnMethod::Closest, "fly present heading".to_owned())
            } else if let Some(deg) = args.left_degrees {
                let hdg = normalize_heading(ac.nav.heading - deg);
                (hdg, TurnMethod::Left, format!("turn {deg:.0} degrees left"))
            } else if let Some(deg) = args.right_degrees {
                let hdg = normalize_heading(ac.nav.heading + deg);
                (hdg, TurnMethod::Right, format!("turn {deg:.0} degrees right"))
            } else {
                let hdg = args.heading.ok_or(SimError::InvalidHeading)?;
                if !(1.0..=360.0).contains(&hdg) {
                    return Err(SimError::InvalidHeading);
                }
                let readback = match args.turn {
                    TurnMethod::Closest => format!("fly heading {}", format_heading(hdg)),
                    TurnMethod::Left => format!("turn left heading {}", format_heading(hdg)),
                    TurnMethod::Right => format!("turn right heading {}", format_heading(hdg)),
                };
                (hdg, args.turn, readback)
            };

            ac.nav.assigned_heading = Some(heading);
            ac.nav.turn = turn;
            ac.nav.depart_fix = None;
            ac.nav.approach.cleared = false;
            ac.nav.approach.straight_in = false;
            ac.nav.approach.intercepting = false;
            Ok(readback)
        })
    }

    /// Join the localizer of the expected approach from the current vector.
    pub fn intercept_localizer(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |state, ac| {
            let approach = ac
                .nav
                .approach
                .expected
                .clone()
                .ok_or(SimError::UnableCommand)?;
            if ac.nav.assigned_heading.is_none() {
                return Err(SimError::UnableCommand);
            }
            let wps = approach_waypoints(state, ac, &approach).ok_or(SimError::UnknownApproach)?;
            ac.nav.waypoints = wps;
            ac.nav.approach.intercepting = true;
            Ok(format!(
                "intercepting the {} localizer",
                approach_name(state, ac, &approach)
            ))
        })
    }

    // -----------------------------------------------------------------------
    // Speed
    // -----------------------------------------------------------------------

    /// Assign `speed` knots, immediately or once the assigned altitude is
    /// reached. Zero cancels speed restrictions.
    pub fn assign_speed(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        speed: f32,
        after_altitude: bool,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            if speed.abs() < f32::EPSILON {
                ac.nav.assigned_speed = None;
                ac.nav.deferred_speed = None;
                return Ok("cancel speed restrictions".to_owned());
            }
            let perf = ac.performance;
            if !speed.is_finite() || speed < perf.min_speed || speed > perf.max_speed {
                return Err(SimError::UnableCommand);
            }
            if after_altitude && ac.nav.assigned_altitude.is_some() {
                ac.nav.deferred_speed = Some(speed);
                let alt = ac.nav.assigned_altitude.unwrap_or_default();
                Ok(format!(
                    "at {} maintain {speed:.0} knots",
                    format_altitude(alt)
                ))
            } else {
                ac.nav.assigned_speed = Some(speed);
                ac.nav.deferred_speed = None;
                Ok(format!("maintain {speed:.0} knots"))
            }
        })
    }

    /// Slow to the aircraft's minimum clean speed.
    pub fn slowest_practical_speed(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            ac.nav.assigned_speed = Some(ac.performance.min_speed);
            ac.nav.deferred_speed = None;
            Ok("slowest practical speed".to_owned())
        })
    }

    /// Fly the aircraft's maximum speed.
    pub fn maximum_forward_speed(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            ac.nav.assigned_speed = Some(ac.performance.max_speed);
            ac.nav.deferred_speed = None;
            Ok("maximum forward speed".to_owned())
        })
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    /// Report current (and assigned) speed.
    pub fn say_speed(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            let current = ac.nav.speed.round();
            Ok(match ac.nav.assigned_speed {
                Some(spd) if spd - current >= 1.0 => {
                    format!("at {current:.0} knots increasing to {spd:.0}")
                }
                Some(spd) if current - spd >= 1.0 => {
                    format!("at {current:.0} knots slowing to {spd:.0}")
                }
                _ => format!("maintaining {current:.0} knots"),
            })
        })
    }

    /// Report current (and assigned) heading.
    pub fn say_heading(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            let current = format_heading(ac.nav.heading);
            Ok(match ac.nav.assigned_heading {
                Some(hdg) if (hdg - ac.nav.heading).abs() >= 1.0 => {
                    format!("heading {current}, turning to {}", format_heading(hdg))
                }
                Some(_) => format!("heading {current}"),
                None => format!("heading {current}, on course"),
            })
        })
    }

    /// Report current (and assigned) altitude.
    pub fn say_altitude(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            let current = format_altitude(ac.nav.altitude);
            Ok(match ac.nav.assigned_altitude {
                Some(alt) if alt > ac.nav.altitude + 100.0 => {
                    format!("at {current} climbing to {}", format_altitude(alt))
                }
                Some(alt) if alt < ac.nav.altitude - 100.0 => {
                    format!("at {current} descending to {}", format_altitude(alt))
                }
                _ => format!("maintaining {current}"),
            })
        })
    }

    // -----------------------------------------------------------------------
    // Route
    // -----------------------------------------------------------------------

    /// Proceed direct to `fix`, which must be on the route or the expected
    /// approach.
    pub fn direct_fix(&mut self, tcp: &Tcp, cs: &Callsign, fix: &str) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |state, ac| {
            if let Some(idx) = route_index(ac, fix) {
                ac.nav.waypoints.drain(..idx);
            } else {
                let expected = ac.nav.approach.expected.clone();
                let mut wps = expected
                    .and_then(|appr| approach_waypoints(state, ac, &appr))
                    .ok_or(SimError::FixNotInRoute)?;
                let idx = wps
                    .iter()
                    .position(|wp| wp.fix == fix)
                    .ok_or(SimError::FixNotInRoute)?;
                wps.drain(..idx);
                ac.nav.waypoints = wps;
            }
            ac.nav.assigned_heading = None;
            ac.nav.turn = TurnMethod::Closest;
            ac.nav.approach.intercepting = false;
            Ok(format!("direct {fix}"))
        })
    }

    /// After passing `fix`, proceed direct to `to`.
    pub fn depart_fix_direct(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        fix: &str,
        to: &str,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            let from = route_index(ac, fix).ok_or(SimError::FixNotInRoute)?;
            match route_index(ac, to) {
                Some(idx) if idx > from => {}
                Some(_) => return Err(SimError::UnableCommand),
                None => return Err(SimError::FixNotInRoute),
            }
            ac.nav.depart_fix = Some(DepartFix {
                fix: fix.to_owned(),
                action: DepartFixAction::Direct(to.to_owned()),
            });
            Ok(format!("depart {fix} direct {to}"))
        })
    }

    /// After passing `fix`, fly `heading`.
    pub fn depart_fix_heading(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        fix: &str,
        heading: f32,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            if !(1.0..=360.0).contains(&heading) {
                return Err(SimError::InvalidHeading);
            }
            route_index(ac, fix).ok_or(SimError::FixNotInRoute)?;
            ac.nav.depart_fix = Some(DepartFix {
                fix: fix.to_owned(),
                action: DepartFixAction::Heading(heading),
            });
            Ok(format!("depart {fix} heading {}", format_heading(heading)))
        })
    }

    /// Cross `fix` within an altitude window and/or at a speed.
    pub fn cross_fix_at(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        fix: &str,
        altitude: Option<AltitudeRestriction>,
        speed: Option<f32>,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            route_index(ac, fix).ok_or(SimError::FixNotInRoute)?;
            if let Some(spd) = speed
                && (spd < ac.performance.min_speed || spd > ac.performance.max_speed)
            {
                return Err(SimError::UnableCommand);
            }

            let mut readback = format!("cross {fix}");
            if let Some(ar) = altitude {
                let [lo, hi] = ar.range;
                let text = if (lo - hi).abs() < f32::EPSILON {
                    format!(" at {}", format_altitude(lo))
                } else if hi == 0.0 {
                    format!(" at or above {}", format_altitude(lo))
                } else if lo == 0.0 {
                    format!(" at or below {}", format_altitude(hi))
                } else {
                    format!(
                        " between {} and {}",
                        format_altitude(lo),
                        format_altitude(hi)
                    )
                };
                readback.push_str(&text);
                // The crossing restriction replaces any altitude
                // assignment.
                ac.nav.assigned_altitude = None;
            }
            if let Some(spd) = speed {
                readback.push_str(&format!(" at {spd:.0} knots"));
                ac.nav.assigned_speed = None;
            }
            ac.nav.cross_fix = Some(CrossFixRestriction {
                fix: fix.to_owned(),
                altitude,
                speed,
            });
            Ok(readback)
        })
    }

    // -----------------------------------------------------------------------
    // Approaches
    // -----------------------------------------------------------------------

    /// Tell the pilot which approach to expect.
    pub fn expect_approach(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        approach: &str,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |state, ac| {
            approach_waypoints(state, ac, approach).ok_or(SimError::UnknownApproach)?;
            ac.nav.approach.expected = Some(approach.to_owned());
            Ok(format!(
                "we'll expect the {} approach",
                approach_name(state, ac, approach)
            ))
        })
    }

    /// Clear the aircraft for the approach it was told to expect.
    pub fn cleared_approach(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        approach: &str,
        straight_in: bool,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |state, ac| {
            let wps = approach_waypoints(state, ac, approach).ok_or(SimError::UnknownApproach)?;
            match ac.nav.approach.expected.as_deref() {
                None => return Err(SimError::UnableCommand),
                Some(expected) if expected != approach => {
                    return Err(SimError::ClearedForUnexpectedApproach);
                }
                Some(_) => {}
            }

            // Joining at a fix already on the route keeps the route up to
            // it; on vectors the aircraft intercepts instead.
            if ac.nav.assigned_heading.is_some() {
                ac.nav.waypoints = wps;
                ac.nav.approach.intercepting = true;
            } else {
                let joined = ac.nav.waypoints.iter().enumerate().find_map(|(i, wp)| {
                    wps.iter().position(|a| a.fix == wp.fix).map(|j| (i, j))
                });
                ac.nav.waypoints = match joined {
                    Some((i, j)) => ac
                        .nav
                        .waypoints
                        .iter()
                        .take(i)
                        .cloned()
                        .chain(wps.into_iter().skip(j))
                        .collect(),
                    None => wps,
                };
            }
            ac.nav.approach.cleared = true;
            ac.nav.approach.straight_in = straight_in;
            ac.nav.approach.at_fix_cleared = None;
            ac.nav.assigned_altitude = None;
            ac.nav.climb_via_sid = false;
            ac.nav.descend_via_star = false;

            let name = approach_name(state, ac, approach);
            Ok(if straight_in {
                format!("cleared straight in {name} approach")
            } else {
                format!("cleared {name} approach")
            })
        })
    }

    /// Clear the expected approach once the aircraft passes `fix`. An
    /// empty `approach` stands for the expected one.
    pub fn at_fix_cleared(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        fix: &str,
        approach: &str,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |state, ac| {
            let Some(expected) = ac.nav.approach.expected.clone() else {
                return Err(SimError::UnableCommand);
            };
            let approach = if approach.is_empty() {
                expected.as_str()
            } else {
                approach
            };
            let wps = approach_waypoints(state, ac, approach).ok_or(SimError::UnknownApproach)?;
            if expected != approach {
                return Err(SimError::ClearedForUnexpectedApproach);
            }
            if route_index(ac, fix).is_none() && !wps.iter().any(|wp| wp.fix == fix) {
                return Err(SimError::FixNotInRoute);
            }
            ac.nav.approach.at_fix_cleared = Some(fix.to_owned());
            Ok(format!(
                "at {fix} cleared {} approach",
                approach_name(state, ac, approach)
            ))
        })
    }

    /// Withdraw an approach clearance.
    pub fn cancel_approach(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            if !ac.nav.approach.cleared {
                return Err(SimError::NotClearedForApproach);
            }
            ac.nav.approach.cleared = false;
            ac.nav.approach.straight_in = false;
            ac.nav.approach.intercepting = false;
            ac.nav.assigned_altitude = Some(ac.nav.altitude);
            Ok("cancel approach clearance".to_owned())
        })
    }

    // -----------------------------------------------------------------------
    // Frequency and transponder
    // -----------------------------------------------------------------------

    /// Switch a cleared arrival to the tower.
    pub fn contact_tower(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |state, ac| {
            if !ac.nav.approach.cleared {
                return Err(SimError::NotClearedForApproach);
            }
            let tower = state
                .airports
                .get(&ac.flight_plan.arrival_airport)
                .and_then(|ap| ap.tower_controller.clone());
            ac.controlling_controller = tower;
            Ok("contact tower".to_owned())
        })
    }

    /// Send the aircraft to the position tracking it.
    pub fn handoff_control(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let tracking = self
            .aircraft(cs)?
            .tracking_controller
            .clone()
            .ok_or(SimError::TrackIsNotActive)?;
        if &tracking == tcp {
            return Err(SimError::InvalidController);
        }
        let ctrl = self
            .state
            .controllers
            .get(&tracking)
            .cloned()
            .ok_or(SimError::NoController)?;

        self.dispatch_controlled(tcp, cs, |_, _| {
            let name = if ctrl.radio_name.is_empty() {
                tracking.as_str()
            } else {
                ctrl.radio_name.as_str()
            };
            Ok(format!(
                "contact {name} on {}, good day",
                ctrl.frequency_string()
            ))
        })?;
        self.enqueue_controller_contact(cs, tracking, HANDOFF_CONTROL_DELAY_SECS);
        Ok(())
    }

    /// Squawk ident.
    pub fn ident(&mut self, tcp: &Tcp, cs: &Callsign) -> Result<(), SimError> {
        let until = offset_secs(self.state.sim_time, IDENT_SECS);
        self.dispatch_controlled(tcp, cs, |_, ac| {
            ac.ident_until = Some(until);
            Ok("ident".to_owned())
        })?;
        self.post_event(Event {
            callsign: Some(cs.clone()),
            ..Event::new(EventType::Ident)
        });
        Ok(())
    }

    /// Assign a new beacon code.
    pub fn change_squawk(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        squawk: Squawk,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            ac.squawk = squawk;
            Ok(format!("squawk {squawk}"))
        })
    }

    /// Change transponder mode.
    pub fn change_transponder_mode(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        mode: TransponderMode,
    ) -> Result<(), SimError> {
        self.dispatch_controlled(tcp, cs, |_, ac| {
            ac.mode = mode;
            Ok(match mode {
                TransponderMode::Standby => "squawk standby",
                TransponderMode::On => "squawk normal",
                TransponderMode::Altitude => "squawk altitude",
            }
            .to_owned())
        })
    }
}
