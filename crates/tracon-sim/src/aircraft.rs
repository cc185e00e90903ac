//! Aircraft-level behavior that does not need the rest of the sim.

use tracon_types::{Aircraft, RadioTransmission, RadioTransmissionType, Tcp, TurnMethod};

/// Aircraft beyond this many nm from the scope center are removed.
pub const CULL_DISTANCE_NM: f32 = 250.0;

/// A landing aircraft more than this many feet above the threshold
/// restriction goes around instead.
pub const LANDING_ALTITUDE_TOLERANCE: f32 = 150.0;

/// Format an altitude the way a pilot says it: `5,000`, `FL230`.
pub fn format_altitude(alt: f32) -> String {
    let hundreds = (alt / 100.0).round();
    if hundreds >= 180.0 {
        format!("FL{hundreds:.0}")
    } else if hundreds >= 10.0 {
        let thousands = (hundreds / 10.0).trunc();
        let rest = (hundreds % 10.0) * 100.0;
        format!("{thousands:.0},{rest:03.0}")
    } else {
        format!("{:.0}", hundreds * 100.0)
    }
}

/// Move references to a departing position onto the primary controller.
///
/// The primary's own references are left alone: the sim stops while the
/// primary is away, and its tracks should be waiting when it returns.
pub fn handle_controller_disconnect(ac: &mut Aircraft, tcp: &Tcp, primary: &Tcp) {
    if tcp == primary {
        return;
    }
    for slot in [
        &mut ac.tracking_controller,
        &mut ac.controlling_controller,
        &mut ac.handoff_track_controller,
    ] {
        if slot.as_ref() == Some(tcp) {
            *slot = Some(primary.clone());
        }
    }
}

/// Retag every reference to `from` as `to`.
pub fn transfer_tracks(ac: &mut Aircraft, from: &Tcp, to: &Tcp) {
    for slot in [
        &mut ac.tracking_controller,
        &mut ac.controlling_controller,
        &mut ac.handoff_track_controller,
    ] {
        if slot.as_ref() == Some(from) {
            *slot = Some(to.clone());
        }
    }
    for ql in &mut ac.force_ql_controllers {
        if ql == from {
            *ql = to.clone();
        }
    }
}

/// Sanity checks run every update; problems are reported, never fixed.
pub fn check(ac: &Aircraft) -> Vec<&'static str> {
    let mut problems = Vec::new();
    if !ac.nav.position.is_finite() {
        problems.push("non-finite position");
    }
    if !ac.nav.altitude.is_finite() || ac.nav.altitude < -1500.0 {
        problems.push("implausible altitude");
    }
    if !ac.nav.speed.is_finite() || ac.nav.speed < 0.0 {
        problems.push("negative speed");
    }
    if !(0.0..=360.0).contains(&ac.nav.heading) {
        problems.push("heading out of range");
    }
    if ac.handoff_track_controller.is_some() && ac.tracking_controller.is_none() {
        problems.push("handoff offered for an untracked aircraft");
    }
    problems
}

/// What a departure says on first contact after "departing <airport>".
pub fn departure_message(ac: &Aircraft) -> String {
    let passing = format_altitude(ac.nav.altitude);
    if ac.nav.climb_via_sid {
        return format!("passing {passing}, climbing via the SID");
    }
    match ac.nav.assigned_altitude {
        Some(alt) => format!("passing {passing} for {}", format_altitude(alt)),
        None => format!("passing {passing}"),
    }
}

/// What an aircraft says when checking in on a new frequency.
pub fn contact_message(ac: &Aircraft) -> String {
    let at = format_altitude(ac.nav.altitude);
    match ac.nav.assigned_altitude {
        Some(alt) if (alt - ac.nav.altitude).abs() > 100.0 => {
            format!("{at} for {}", format_altitude(alt))
        }
        _ => format!("at {at}"),
    }
}

/// Abandon the approach: runway heading, climb, speed restrictions off.
///
/// Returns the pilot's transmission, addressed to whoever is controlling
/// the aircraft; the caller sets the controlling position first.
pub fn go_around(ac: &mut Aircraft) -> Vec<RadioTransmission> {
    let climb_to = ((ac.nav.altitude + 2500.0) / 1000.0).ceil().max(3.0) * 1000.0;

    ac.nav.assigned_heading = Some(ac.nav.heading);
    ac.nav.turn = TurnMethod::Closest;
    ac.nav.assigned_altitude = Some(climb_to);
    ac.nav.deferred_altitude = None;
    ac.nav.assigned_speed = None;
    ac.nav.deferred_speed = None;
    ac.nav.approach.cleared = false;
    ac.nav.approach.straight_in = false;
    ac.nav.approach.intercepting = false;
    ac.nav.approach.at_fix_cleared = None;
    ac.nav.waypoints.clear();
    ac.go_around_distance = None;

    vec![RadioTransmission {
        controller: ac.controlling_controller.clone(),
        message: format!(
            "going around, runway heading, climbing to {}",
            format_altitude(climb_to)
        ),
        transmission_type: RadioTransmissionType::Unexpected,
    }]
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::float_cmp)]
mod tests {
    use super::*;

    fn tcp(s: &str) -> Tcp {
        Tcp::from(s)
    }

    #[test]
    fn altitudes_format_like_speech() {
        assert_eq!(format_altitude(5000.0), "5,000");
        assert_eq!(format_altitude(12_340.0), "12,300");
        assert_eq!(format_altitude(23_000.0), "FL230");
        assert_eq!(format_altitude(800.0), "800");
    }

    #[test]
    fn disconnect_moves_everything_to_primary() {
        let mut ac = Aircraft {
            tracking_controller: Some(tcp("4P")),
            controlling_controller: Some(tcp("4P")),
            handoff_track_controller: None,
            ..Aircraft::default()
        };
        handle_controller_disconnect(&mut ac, &tcp("4P"), &tcp("2J"));
        assert_eq!(ac.tracking_controller, Some(tcp("2J")));
        assert_eq!(ac.controlling_controller, Some(tcp("2J")));
    }

    #[test]
    fn primary_disconnect_changes_nothing() {
        let mut ac = Aircraft {
            tracking_controller: Some(tcp("2J")),
            ..Aircraft::default()
        };
        handle_controller_disconnect(&mut ac, &tcp("2J"), &tcp("2J"));
        assert_eq!(ac.tracking_controller, Some(tcp("2J")));
    }

    #[test]
    fn transfer_retags_only_matching_slots() {
        let mut ac = Aircraft {
            tracking_controller: Some(tcp("4P")),
            controlling_controller: Some(tcp("2K")),
            force_ql_controllers: vec![tcp("4P")],
            ..Aircraft::default()
        };
        transfer_tracks(&mut ac, &tcp("4P"), &tcp("4Q"));
        assert_eq!(ac.tracking_controller, Some(tcp("4Q")));
        assert_eq!(ac.controlling_controller, Some(tcp("2K")));
        assert_eq!(ac.force_ql_controllers, vec![tcp("4Q")]);
    }

    #[test]
    fn check_flags_bad_state() {
        let mut ac = Aircraft::default();
        ac.nav.heading = 90.0;
        assert!(check(&ac).is_empty());
        ac.nav.speed = -5.0;
        ac.handoff_track_controller = Some(tcp("2J"));
        assert_eq!(check(&ac).len(), 2);
    }

    #[test]
    fn go_around_climbs_and_drops_the_approach() {
        let mut ac = Aircraft::default();
        ac.nav.altitude = 400.0;
        ac.nav.heading = 220.0;
        ac.nav.approach.cleared = true;
        ac.controlling_controller = Some(tcp("4P"));
        let rt = go_around(&mut ac);
        assert_eq!(ac.nav.assigned_altitude, Some(3000.0));
        assert_eq!(ac.nav.assigned_heading, Some(220.0));
        assert!(!ac.nav.approach.cleared);
        assert_eq!(rt.len(), 1);
        assert_eq!(rt[0].controller, Some(tcp("4P")));
    }
}
