//! Per-second aircraft motion.
//!
//! The engine treats flight dynamics as a capability it calls once per
//! simulated second for each active aircraft. [`KinematicDynamics`] is a
//! deliberately simple model: it turns, climbs, and accelerates toward the
//! current targets at the rates in the aircraft's [`Performance`], flies
//! the route when no heading is assigned, and reports each waypoint as it
//! is passed so the engine can run the waypoint's scripted actions.
//!
//! [`Performance`]: tracon_types::Performance

use tracon_types::geo::{heading_between, heading_signed_turn, nm_distance, normalize_heading, offset};
use tracon_types::{Aircraft, DepartFixAction, TurnMethod, Waypoint};

/// Seconds per hour, for knots to nm-per-second.
const SECONDS_PER_HOUR: f32 = 3600.0;

/// A waypoint counts as passed once within this many seconds of flight.
const WAYPOINT_CAPTURE_SECONDS: f32 = 1.5;

/// Expedited climbs and descents use this multiple of the normal rate.
const EXPEDITE_FACTOR: f32 = 1.5;

/// Headings within this many degrees of the inbound course capture it.
const INTERCEPT_WINDOW_DEGREES: f32 = 45.0;

/// The motion model the engine drives once per simulated second.
pub trait AircraftDynamics: Send + std::fmt::Debug {
    /// Advance `ac` by one second. Returns the waypoint passed during the
    /// step, if any.
    fn update(&self, ac: &mut Aircraft) -> Option<Waypoint>;

    /// Route distance in nm from the aircraft to the landing waypoint of
    /// the approach it is cleared for.
    fn distance_to_end_of_approach(&self, ac: &Aircraft) -> Option<f32>;
}

/// First-order kinematic model.
#[derive(Debug, Clone, Copy, Default)]
pub struct KinematicDynamics;

impl AircraftDynamics for KinematicDynamics {
    fn update(&self, ac: &mut Aircraft) -> Option<Waypoint> {
        try_intercept(ac);
        update_heading(ac);
        update_altitude(ac);
        update_speed(ac);

        let nm = ac.nav.speed / SECONDS_PER_HOUR;
        ac.nav.position = offset(ac.nav.position, ac.nav.heading, nm);

        if ac.nav.assigned_heading.is_some() {
            return None;
        }
        let wp = ac.nav.waypoints.first()?;
        let capture = (nm * WAYPOINT_CAPTURE_SECONDS).max(0.1);
        if !wp.location.is_zero() && nm_distance(ac.nav.position, wp.location) > capture {
            return None;
        }
        let passed = ac.nav.waypoints.remove(0);
        on_waypoint_passed(ac, &passed);
        Some(passed)
    }

    fn distance_to_end_of_approach(&self, ac: &Aircraft) -> Option<f32> {
        if !ac.nav.approach.cleared {
            return None;
        }
        let land = ac.nav.waypoints.iter().position(|wp| wp.land)?;
        let mut total = 0.0;
        let mut from = ac.nav.position;
        for wp in ac.nav.waypoints.iter().take(land.saturating_add(1)) {
            total += nm_distance(from, wp.location);
            from = wp.location;
        }
        Some(total)
    }
}

/// Apply clearances that trigger at a fix.
fn on_waypoint_passed(ac: &mut Aircraft, wp: &Waypoint) {
    if let Some(hdg) = wp.heading {
        ac.nav.assigned_heading = Some(hdg);
        ac.nav.turn = TurnMethod::Closest;
    }

    if ac.nav.cross_fix.as_ref().is_some_and(|cf| cf.fix == wp.fix) {
        ac.nav.cross_fix = None;
    }

    if ac.nav.approach.at_fix_cleared.as_deref() == Some(wp.fix.as_str()) {
        ac.nav.approach.at_fix_cleared = None;
        ac.nav.approach.cleared = true;
    }

    if ac.nav.depart_fix.as_ref().is_some_and(|df| df.fix == wp.fix) {
        if let Some(df) = ac.nav.depart_fix.take() {
            match df.action {
                DepartFixAction::Heading(hdg) => {
                    ac.nav.assigned_heading = Some(hdg);
                    ac.nav.turn = TurnMethod::Closest;
                }
                DepartFixAction::Direct(fix) => {
                    if let Some(idx) = ac.nav.waypoints.iter().position(|w| w.fix == fix) {
                        ac.nav.waypoints.drain(..idx);
                    }
                }
            }
        }
    }
}

/// Join the approach course when flying a heading to intercept.
fn try_intercept(ac: &mut Aircraft) {
    if !ac.nav.approach.intercepting {
        return;
    }
    let (Some(_), Some(next)) = (ac.nav.assigned_heading, ac.nav.waypoints.first()) else {
        return;
    };
    let course = heading_between(ac.nav.position, next.location);
    if heading_signed_turn(ac.nav.heading, course).abs() <= INTERCEPT_WINDOW_DEGREES {
        ac.nav.assigned_heading = None;
        ac.nav.approach.intercepting = false;
    }
}

fn update_heading(ac: &mut Aircraft) {
    let target = match (ac.nav.assigned_heading, ac.nav.waypoints.first()) {
        (Some(hdg), _) => hdg,
        (None, Some(wp)) if !wp.location.is_zero() => heading_between(ac.nav.position, wp.location),
        _ => return,
    };

    let turn = match ac.nav.turn {
        TurnMethod::Closest => heading_signed_turn(ac.nav.heading, target),
        TurnMethod::Right => (target - ac.nav.heading).rem_euclid(360.0),
        TurnMethod::Left => -(ac.nav.heading - target).rem_euclid(360.0),
    };
    let rate = ac.performance.turn_rate;
    if turn.abs() <= rate {
        ac.nav.heading = normalize_heading(target);
        ac.nav.turn = TurnMethod::Closest;
    } else {
        ac.nav.heading = normalize_heading(ac.nav.heading + rate.copysign(turn));
    }
}

/// Altitude the aircraft is currently working toward.
fn target_altitude(ac: &Aircraft) -> Option<f32> {
    if let Some(alt) = ac.nav.assigned_altitude {
        return Some(alt);
    }
    if let Some(ar) = ac.nav.cross_fix.as_ref().and_then(|cf| cf.altitude) {
        return Some(ar.target_altitude(ac.nav.altitude));
    }
    let follows_route = ac.nav.climb_via_sid || ac.nav.descend_via_star || ac.nav.approach.cleared;
    if follows_route {
        return ac
            .nav
            .waypoints
            .iter()
            .find_map(|wp| wp.altitude_restriction)
            .map(|ar| ar.target_altitude(ac.nav.altitude));
    }
    None
}

fn update_altitude(ac: &mut Aircraft) {
    let Some(target) = target_altitude(ac) else {
        return;
    };
    let factor = if ac.nav.expedite { EXPEDITE_FACTOR } else { 1.0 };
    let delta = target - ac.nav.altitude;
    let max_step = if delta > 0.0 {
        ac.performance.climb_rate
    } else {
        ac.performance.descent_rate
    } * factor
        / 60.0;

    if delta.abs() <= max_step {
        ac.nav.altitude = target;
        ac.nav.expedite = false;
        if ac.nav.assigned_altitude.is_some()
            && let Some(spd) = ac.nav.deferred_speed.take()
        {
            ac.nav.assigned_speed = Some(spd);
        }
    } else {
        ac.nav.altitude += max_step.copysign(delta);
    }
}

fn update_speed(ac: &mut Aircraft) {
    let waypoint_speed = ac.nav.waypoints.first().and_then(|wp| wp.speed);
    let cross_speed = ac.nav.cross_fix.as_ref().and_then(|cf| cf.speed);
    let Some(target) = ac.nav.assigned_speed.or(cross_speed).or(waypoint_speed) else {
        return;
    };
    let delta = target - ac.nav.speed;
    let rate = ac.performance.acceleration;
    if delta.abs() <= rate {
        ac.nav.speed = target;
        if ac.nav.assigned_speed.is_some()
            && let Some(alt) = ac.nav.deferred_altitude.take()
        {
            ac.nav.assigned_altitude = Some(alt);
        }
    } else {
        ac.nav.speed += rate.copysign(delta);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tracon_types::{AltitudeRestriction, Point2LL};

    use super::*;

    fn aircraft_at(pos: Point2LL, heading: f32, speed: f32) -> Aircraft {
        let mut ac = Aircraft::default();
        ac.nav.position = pos;
        ac.nav.heading = heading;
        ac.nav.speed = speed;
        ac.nav.altitude = 5000.0;
        ac
    }

    fn waypoint(fix: &str, location: Point2LL) -> Waypoint {
        Waypoint {
            fix: fix.to_owned(),
            location,
            ..Waypoint::default()
        }
    }

    #[test]
    fn turns_at_the_performance_rate() {
        let mut ac = aircraft_at(Point2LL::new(-73.0, 40.0), 90.0, 250.0);
        ac.nav.assigned_heading = Some(180.0);
        KinematicDynamics.update(&mut ac);
        assert!((ac.nav.heading - 93.0).abs() < 0.01);
    }

    #[test]
    fn left_turn_goes_the_long_way() {
        let mut ac = aircraft_at(Point2LL::new(-73.0, 40.0), 90.0, 250.0);
        ac.nav.assigned_heading = Some(120.0);
        ac.nav.turn = TurnMethod::Left;
        KinematicDynamics.update(&mut ac);
        assert!((ac.nav.heading - 87.0).abs() < 0.01);
    }

    #[test]
    fn climbs_toward_assigned_altitude() {
        let mut ac = aircraft_at(Point2LL::new(-73.0, 40.0), 90.0, 250.0);
        ac.nav.assigned_altitude = Some(6000.0);
        KinematicDynamics.update(&mut ac);
        let per_second = ac.performance.climb_rate / 60.0;
        assert!((ac.nav.altitude - (5000.0 + per_second)).abs() < 0.01);
    }

    #[test]
    fn passes_a_nearby_waypoint() {
        let pos = Point2LL::new(-73.0, 40.0);
        let mut ac = aircraft_at(pos, 90.0, 250.0);
        let next = offset(pos, 90.0, 0.05);
        ac.nav.waypoints = vec![waypoint("ONE", next), waypoint("TWO", offset(pos, 90.0, 20.0))];
        let passed = KinematicDynamics.update(&mut ac).unwrap();
        assert_eq!(passed.fix, "ONE");
        assert_eq!(ac.nav.waypoints.len(), 1);
    }

    #[test]
    fn distant_waypoint_is_not_passed() {
        let pos = Point2LL::new(-73.0, 40.0);
        let mut ac = aircraft_at(pos, 90.0, 250.0);
        ac.nav.waypoints = vec![waypoint("FAR", offset(pos, 90.0, 30.0))];
        assert!(KinematicDynamics.update(&mut ac).is_none());
    }

    #[test]
    fn depart_fix_heading_applies_at_the_fix() {
        let pos = Point2LL::new(-73.0, 40.0);
        let mut ac = aircraft_at(pos, 90.0, 250.0);
        ac.nav.waypoints = vec![waypoint("ONE", offset(pos, 90.0, 0.05))];
        ac.nav.depart_fix = Some(tracon_types::DepartFix {
            fix: "ONE".to_owned(),
            action: DepartFixAction::Heading(270.0),
        });
        KinematicDynamics.update(&mut ac).unwrap();
        assert_eq!(ac.nav.assigned_heading, Some(270.0));
        assert!(ac.nav.depart_fix.is_none());
    }

    #[test]
    fn approach_distance_only_when_cleared() {
        let pos = Point2LL::new(-73.0, 40.0);
        let mut ac = aircraft_at(pos, 90.0, 180.0);
        let mut rwy = waypoint("RWY", offset(pos, 90.0, 10.0));
        rwy.land = true;
        rwy.altitude_restriction = Some(AltitudeRestriction::at(100.0));
        ac.nav.waypoints = vec![waypoint("FAF", offset(pos, 90.0, 5.0)), rwy];
        assert!(KinematicDynamics.distance_to_end_of_approach(&ac).is_none());
        ac.nav.approach.cleared = true;
        let d = KinematicDynamics.distance_to_end_of_approach(&ac).unwrap();
        assert!((d - 10.0).abs() < 0.1);
    }
}
