//! Executes a controller's command line against one aircraft.

use serde::{Deserialize, Serialize};
use tracing::debug;
use tracon_types::{Callsign, Tcp};

use crate::command::{Command, parse_command};
use crate::error::SimError;
use crate::sim::Sim;

/// Outcome of a command line. Both fields are empty when every token
/// succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AircraftCommandsResult {
    /// Why the first failing token failed.
    pub error_message: String,
    /// The failing token and everything after it.
    pub remaining_input: String,
}

impl Sim {
    /// Run each token of `commands` in order, stopping at the first one
    /// that fails. Tokens before the failure stay applied.
    pub fn run_aircraft_commands(
        &mut self,
        tcp: &Tcp,
        cs: &Callsign,
        commands: &str,
    ) -> AircraftCommandsResult {
        let tokens: Vec<&str> = commands.split_whitespace().collect();
        for (i, token) in tokens.iter().enumerate() {
            if let Err(err) = self.run_one(tcp, cs, token) {
                debug!(callsign = %cs, tcp = %tcp, token, error = %err, "Command failed");
                return AircraftCommandsResult {
                    error_message: err.to_string(),
                    remaining_input: tokens.get(i..).unwrap_or_default().join(" "),
                };
            }
        }
        AircraftCommandsResult::default()
    }

    fn run_one(&mut self, tcp: &Tcp, cs: &Callsign, token: &str) -> Result<(), SimError> {
        let command = parse_command(token, |fix| self.state.locate(fix).is_some())?;
        match command {
            Command::Altitude {
                altitude,
                after_speed,
            } => self.assign_altitude(tcp, cs, altitude, after_speed),
            Command::Heading(args) => self.assign_heading(tcp, cs, args),
            Command::Speed {
                speed,
                after_altitude,
            } => self.assign_speed(tcp, cs, speed, after_altitude),
            Command::SlowestPractical => self.slowest_practical_speed(tcp, cs),
            Command::MaximumForward => self.maximum_forward_speed(tcp, cs),
            Command::SaySpeed => self.say_speed(tcp, cs),
            Command::SayHeading => self.say_heading(tcp, cs),
            Command::SayAltitude => self.say_altitude(tcp, cs),
            Command::DirectFix(fix) => self.direct_fix(tcp, cs, &fix),
            Command::DepartFixDirect { fix, to } => self.depart_fix_direct(tcp, cs, &fix, &to),
            Command::DepartFixHeading { fix, heading } => {
                self.depart_fix_heading(tcp, cs, &fix, heading)
            }
            Command::CrossFix {
                fix,
                altitude,
                speed,
            } => self.cross_fix_at(tcp, cs, &fix, altitude, speed),
            Command::ExpectApproach(approach) => self.expect_approach(tcp, cs, &approach),
            Command::ClearedApproach {
                approach,
                straight_in,
            } => self.cleared_approach(tcp, cs, &approach, straight_in),
            Command::AtFixCleared { fix, approach } => {
                self.at_fix_cleared(tcp, cs, &fix, &approach)
            }
            Command::CancelApproach => self.cancel_approach(tcp, cs),
            Command::ClimbViaSid => self.climb_via_sid(tcp, cs),
            Command::DescendViaStar => self.descend_via_star(tcp, cs),
            Command::InterceptLocalizer => self.intercept_localizer(tcp, cs),
            Command::ExpediteClimb => self.expedite_climb(tcp, cs),
            Command::ExpediteDescent => self.expedite_descent(tcp, cs),
            Command::Ident => self.ident(tcp, cs),
            Command::ContactTower => self.contact_tower(tcp, cs),
            Command::HandoffControl => self.handoff_control(tcp, cs),
            Command::Squawk(sq) => self.change_squawk(tcp, cs, sq),
            Command::TransponderMode(mode) => self.change_transponder_mode(tcp, cs, mode),
            Command::Delete => {
                self.delete_aircraft(tcp, cs);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::testing::{add_aircraft, tcp, test_sim};

    fn setup() -> Sim {
        let mut sim = test_sim();
        sim.sign_on(&tcp("2J"), false).unwrap();
        add_aircraft(&mut sim, "AAL1", Some("2J"), Some("2J"));
        sim
    }

    #[test]
    fn all_tokens_succeed() {
        let mut sim = setup();
        let res = sim.run_aircraft_commands(&tcp("2J"), &Callsign::from("AAL1"), "H090 A80 S210");
        assert_eq!(res, AircraftCommandsResult::default());
        let nav = &sim.state.aircraft["AAL1"].nav;
        assert_eq!(nav.assigned_heading, Some(90.0));
        assert_eq!(nav.assigned_altitude, Some(8000.0));
        assert_eq!(nav.assigned_speed, Some(210.0));
    }

    #[test]
    fn stops_at_first_failure_keeping_earlier_tokens() {
        let mut sim = setup();
        let res =
            sim.run_aircraft_commands(&tcp("2J"), &Callsign::from("AAL1"), "H090 S210 ZZZ A80");
        assert_eq!(res.error_message, "Invalid command syntax");
        assert_eq!(res.remaining_input, "ZZZ A80");
        let nav = &sim.state.aircraft["AAL1"].nav;
        assert_eq!(nav.assigned_speed, Some(210.0));
        assert_eq!(nav.assigned_altitude, None);
    }

    #[test]
    fn semantic_errors_report_their_message() {
        let mut sim = setup();
        let res = sim.run_aircraft_commands(&tcp("2J"), &Callsign::from("AAL1"), "CAC");
        assert_eq!(res.error_message, SimError::NotClearedForApproach.to_string());
        assert_eq!(res.remaining_input, "CAC");
    }

    #[test]
    fn delete_then_anything_fails_on_the_missing_aircraft() {
        let mut sim = setup();
        let res = sim.run_aircraft_commands(&tcp("2J"), &Callsign::from("AAL1"), "X H090");
        assert!(!sim.state.aircraft.contains_key("AAL1"));
        assert_eq!(res.error_message, SimError::NoAircraftForCallsign.to_string());
        assert_eq!(res.remaining_input, "H090");
    }

    #[test]
    fn other_controllers_cannot_command() {
        let mut sim = setup();
        sim.sign_on(&tcp("4P"), false).unwrap();
        let res = sim.run_aircraft_commands(&tcp("4P"), &Callsign::from("AAL1"), "H090");
        assert_eq!(res.error_message, SimError::OtherControllerHasTrack.to_string());
    }
}
