//! The controller command language.
//!
//! A command line is a whitespace-separated list of tokens, each naming
//! one clearance. The first character selects the family; the rest is a
//! number, a fix or approach name, or a `/`-separated list of clauses.
//! Altitudes are written in hundreds of feet.

use tracon_types::{AltitudeRestriction, Squawk, TransponderMode, TurnMethod};

use crate::config::parse_altitude_restriction_hundreds;
use crate::control::HeadingArgs;
use crate::error::SimError;

/// One parsed clearance token.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Climb or descend, optionally once the assigned speed is reached.
    Altitude {
        /// Feet.
        altitude: f32,
        /// Wait for the assigned speed first.
        after_speed: bool,
    },
    /// Heading clearance.
    Heading(HeadingArgs),
    /// Speed clearance; zero cancels speed restrictions.
    Speed {
        /// Knots.
        speed: f32,
        /// Wait for the assigned altitude first.
        after_altitude: bool,
    },
    /// Slowest practical speed.
    SlowestPractical,
    /// Maximum forward speed.
    MaximumForward,
    /// Say speed.
    SaySpeed,
    /// Say heading.
    SayHeading,
    /// Say altitude.
    SayAltitude,
    /// Proceed direct to a fix.
    DirectFix(String),
    /// Depart a fix direct to another.
    DepartFixDirect {
        /// Fix to depart.
        fix: String,
        /// Fix to proceed to.
        to: String,
    },
    /// Depart a fix on a heading.
    DepartFixHeading {
        /// Fix to depart.
        fix: String,
        /// Heading after the fix.
        heading: f32,
    },
    /// Cross a fix at an altitude and/or speed.
    CrossFix {
        /// Fix to cross.
        fix: String,
        /// Altitude window, feet.
        altitude: Option<AltitudeRestriction>,
        /// Knots.
        speed: Option<f32>,
    },
    /// Expect an approach.
    ExpectApproach(String),
    /// Cleared for an approach.
    ClearedApproach {
        /// Approach identifier.
        approach: String,
        /// Straight-in, no procedure turn.
        straight_in: bool,
    },
    /// Cleared for an approach once past a fix.
    AtFixCleared {
        /// Fix.
        fix: String,
        /// Approach identifier; empty for the expected approach.
        approach: String,
    },
    /// Cancel approach clearance.
    CancelApproach,
    /// Climb via SID.
    ClimbViaSid,
    /// Descend via STAR.
    DescendViaStar,
    /// Intercept the localizer.
    InterceptLocalizer,
    /// Expedite climb.
    ExpediteClimb,
    /// Expedite descent.
    ExpediteDescent,
    /// Squawk ident.
    Ident,
    /// Contact tower.
    ContactTower,
    /// Contact the tracking position.
    HandoffControl,
    /// New beacon code.
    Squawk(Squawk),
    /// New transponder mode.
    TransponderMode(TransponderMode),
    /// Remove the aircraft.
    Delete,
}

const fn syntax() -> SimError {
    SimError::InvalidCommandSyntax
}

/// A signed whole number; anything that does not fit an `i16` is a typo.
fn number(s: &str) -> Result<f32, SimError> {
    s.parse::<i16>().ok().map(f32::from).ok_or_else(syntax)
}

fn hundreds(s: &str) -> Result<f32, SimError> {
    number(s).map(|n| n * 100.0)
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

const fn altitude(altitude: f32) -> Command {
    Command::Altitude {
        altitude,
        after_speed: false,
    }
}

fn cross_fix(fix: &str, clauses: &[&str]) -> Result<Command, SimError> {
    let mut altitude = None;
    let mut speed = None;
    for clause in clauses {
        match clause.split_at_checked(1) {
            Some(("A", rest)) if !rest.is_empty() => {
                altitude = Some(parse_altitude_restriction_hundreds(rest).ok_or_else(syntax)?);
            }
            Some(("S", rest)) => speed = Some(number(rest)?),
            _ => return Err(syntax()),
        }
    }
    Ok(Command::CrossFix {
        fix: fix.to_owned(),
        altitude,
        speed,
    })
}

fn turn(cmd: &str, rest: &str, left: bool) -> Result<Command, SimError> {
    let args = match rest.strip_suffix('D') {
        Some(deg) if cmd.len() > 2 => {
            let deg = number(deg)?;
            if left {
                HeadingArgs {
                    left_degrees: Some(deg),
                    ..HeadingArgs::default()
                }
            } else {
                HeadingArgs {
                    right_degrees: Some(deg),
                    ..HeadingArgs::default()
                }
            }
        }
        _ => HeadingArgs {
            heading: Some(number(rest)?),
            turn: if left {
                TurnMethod::Left
            } else {
                TurnMethod::Right
            },
            ..HeadingArgs::default()
        },
    };
    Ok(Command::Heading(args))
}

/// Parse a single token. `locate` reports whether a name is a known fix,
/// which is what separates `D<fix>` from a typo.
///
/// # Errors
///
/// [`SimError::InvalidCommandSyntax`] for anything outside the grammar,
/// [`SimError::InvalidSquawk`] for a malformed beacon code.
#[allow(clippy::too_many_lines)]
pub fn parse_command(cmd: &str, locate: impl Fn(&str) -> bool) -> Result<Command, SimError> {
    if !cmd.is_ascii() || cmd.is_empty() {
        return Err(syntax());
    }
    let (head, rest) = cmd.split_at(1);

    match head {
        "A" => {
            if !rest.is_empty() && all_digits(rest) {
                return hundreds(rest).map(altitude);
            }
            // `A<fix>/C` with no approach means the one already expected.
            match rest.split('/').collect::<Vec<_>>().as_slice() {
                [fix, clause] => match clause.strip_prefix('C') {
                    Some(approach) => Ok(Command::AtFixCleared {
                        fix: (*fix).to_owned(),
                        approach: approach.to_owned(),
                    }),
                    None => Err(syntax()),
                },
                _ => Err(syntax()),
            }
        }

        "C" => {
            if cmd == "CAC" {
                return Ok(Command::CancelApproach);
            }
            if cmd == "CVS" {
                return Ok(Command::ClimbViaSid);
            }
            if let Some(appr) = cmd.strip_prefix("CSI")
                && cmd.len() > 4
                && !all_digits(appr)
            {
                return Ok(Command::ClearedApproach {
                    approach: appr.to_owned(),
                    straight_in: true,
                });
            }
            let clauses: Vec<&str> = rest.split('/').collect();
            if let [fix, more @ ..] = clauses.as_slice()
                && !more.is_empty()
            {
                return cross_fix(fix, more);
            }
            if cmd.len() > 2 && !all_digits(rest) {
                return Ok(Command::ClearedApproach {
                    approach: rest.to_owned(),
                    straight_in: false,
                });
            }
            hundreds(rest).map(altitude)
        }

        "D" => {
            if cmd == "DVS" {
                return Ok(Command::DescendViaStar);
            }
            if let Some((fix, clause)) = rest.split_once('/')
                && clause.len() > 1
            {
                let (kind, arg) = clause.split_at(1);
                return match kind {
                    "D" => Ok(Command::DepartFixDirect {
                        fix: fix.to_owned(),
                        to: arg.to_owned(),
                    }),
                    "H" => Ok(Command::DepartFixHeading {
                        fix: fix.to_owned(),
                        heading: number(arg)?,
                    }),
                    _ => Err(syntax()),
                };
            }
            if rest.starts_with(|c: char| c.is_ascii_digit()) {
                return hundreds(rest).map(altitude);
            }
            if !rest.is_empty() && locate(rest) {
                return Ok(Command::DirectFix(rest.to_owned()));
            }
            Err(syntax())
        }

        "E" => match cmd {
            "ED" => Ok(Command::ExpediteDescent),
            "EC" => Ok(Command::ExpediteClimb),
            _ if !rest.is_empty() => Ok(Command::ExpectApproach(rest.to_owned())),
            _ => Err(syntax()),
        },

        "F" if cmd == "FC" => Ok(Command::HandoffControl),

        "H" => {
            if rest.is_empty() {
                return Ok(Command::Heading(HeadingArgs {
                    present: true,
                    ..HeadingArgs::default()
                }));
            }
            Ok(Command::Heading(HeadingArgs {
                heading: Some(number(rest)?),
                ..HeadingArgs::default()
            }))
        }

        "I" => match cmd {
            "I" => Ok(Command::InterceptLocalizer),
            "ID" => Ok(Command::Ident),
            _ => Err(syntax()),
        },

        "L" => turn(cmd, rest, true),
        "R" => turn(cmd, rest, false),

        "S" => match cmd {
            "S" => Ok(Command::Speed {
                speed: 0.0,
                after_altitude: false,
            }),
            "SMIN" => Ok(Command::SlowestPractical),
            "SMAX" => Ok(Command::MaximumForward),
            "SS" => Ok(Command::SaySpeed),
            "SQS" => Ok(Command::TransponderMode(TransponderMode::Standby)),
            "SQA" => Ok(Command::TransponderMode(TransponderMode::Altitude)),
            "SQON" => Ok(Command::TransponderMode(TransponderMode::On)),
            "SH" => Ok(Command::SayHeading),
            "SA" => Ok(Command::SayAltitude),
            _ => {
                if let Some(code) = cmd.strip_prefix("SQ")
                    && cmd.len() == 6
                {
                    return Squawk::parse(code)
                        .map(Command::Squawk)
                        .ok_or(SimError::InvalidSquawk);
                }
                Ok(Command::Speed {
                    speed: number(rest)?,
                    after_altitude: false,
                })
            }
        },

        "T" => {
            if cmd == "TO" {
                return Ok(Command::ContactTower);
            }
            if cmd.len() <= 2 {
                return Err(syntax());
            }
            if let Some(deg) = rest.strip_suffix('L').and_then(|d| number(d).ok()) {
                return Ok(Command::Heading(HeadingArgs {
                    left_degrees: Some(deg),
                    ..HeadingArgs::default()
                }));
            }
            if let Some(deg) = rest.strip_suffix('R').and_then(|d| number(d).ok()) {
                return Ok(Command::Heading(HeadingArgs {
                    right_degrees: Some(deg),
                    ..HeadingArgs::default()
                }));
            }
            let (kind, arg) = cmd.split_at(2);
            match kind {
                "TS" => Ok(Command::Speed {
                    speed: number(arg)?,
                    after_altitude: true,
                }),
                "TA" | "TC" | "TD" => Ok(Command::Altitude {
                    altitude: hundreds(arg)?,
                    after_speed: true,
                }),
                _ => Err(syntax()),
            }
        }

        "X" => Ok(Command::Delete),

        _ => Err(syntax()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(cmd: &str) -> Result<Command, SimError> {
        parse_command(cmd, |fix| matches!(fix, "CAMRN" | "ZALPO"))
    }

    fn heading(args: HeadingArgs) -> Result<Command, SimError> {
        Ok(Command::Heading(args))
    }

    #[test]
    fn altitudes_are_hundreds_of_feet() {
        assert_eq!(parse("A50"), Ok(altitude(5000.0)));
        assert_eq!(parse("C120"), Ok(altitude(12_000.0)));
        assert_eq!(parse("D30"), Ok(altitude(3000.0)));
        assert_eq!(
            parse("TA80"),
            Ok(Command::Altitude {
                altitude: 8000.0,
                after_speed: true
            })
        );
    }

    #[test]
    fn c_family() {
        assert_eq!(parse("CAC"), Ok(Command::CancelApproach));
        assert_eq!(parse("CVS"), Ok(Command::ClimbViaSid));
        assert_eq!(
            parse("CSII22L"),
            Ok(Command::ClearedApproach {
                approach: "I22L".to_owned(),
                straight_in: true
            })
        );
        assert_eq!(
            parse("CI22L"),
            Ok(Command::ClearedApproach {
                approach: "I22L".to_owned(),
                straight_in: false
            })
        );
        assert_eq!(
            parse("CCAMRN/A80+/S210"),
            Ok(Command::CrossFix {
                fix: "CAMRN".to_owned(),
                altitude: Some(AltitudeRestriction {
                    range: [8000.0, 0.0]
                }),
                speed: Some(210.0),
            })
        );
        assert_eq!(parse("CCAMRN/X10"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("CCAMRN//A80"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("CCAMRN/A"), Err(SimError::InvalidCommandSyntax));
    }

    #[test]
    fn a_family() {
        assert_eq!(
            parse("ACAMRN/CI22L"),
            Ok(Command::AtFixCleared {
                fix: "CAMRN".to_owned(),
                approach: "I22L".to_owned()
            })
        );
        assert_eq!(
            parse("ACAMRN/C"),
            Ok(Command::AtFixCleared {
                fix: "CAMRN".to_owned(),
                approach: String::new()
            })
        );
        assert_eq!(parse("A"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("ACAMRN"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("ACAMRN/"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("ACAMRN/XI22L"), Err(SimError::InvalidCommandSyntax));
    }

    #[test]
    fn d_family() {
        assert_eq!(parse("DVS"), Ok(Command::DescendViaStar));
        assert_eq!(parse("DCAMRN"), Ok(Command::DirectFix("CAMRN".to_owned())));
        assert_eq!(parse("DNOWHERE"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(
            parse("DCAMRN/DZALPO"),
            Ok(Command::DepartFixDirect {
                fix: "CAMRN".to_owned(),
                to: "ZALPO".to_owned()
            })
        );
        assert_eq!(
            parse("DCAMRN/H180"),
            Ok(Command::DepartFixHeading {
                fix: "CAMRN".to_owned(),
                heading: 180.0
            })
        );
        assert_eq!(parse("DCAMRN/Q180"), Err(SimError::InvalidCommandSyntax));
    }

    #[test]
    fn e_f_i_families() {
        assert_eq!(parse("ED"), Ok(Command::ExpediteDescent));
        assert_eq!(parse("EC"), Ok(Command::ExpediteClimb));
        assert_eq!(parse("EI22L"), Ok(Command::ExpectApproach("I22L".to_owned())));
        assert_eq!(parse("E"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("FC"), Ok(Command::HandoffControl));
        assert_eq!(parse("F"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("I"), Ok(Command::InterceptLocalizer));
        assert_eq!(parse("ID"), Ok(Command::Ident));
        assert_eq!(parse("IX"), Err(SimError::InvalidCommandSyntax));
    }

    #[test]
    fn headings_and_turns() {
        assert_eq!(
            parse("H"),
            heading(HeadingArgs {
                present: true,
                ..HeadingArgs::default()
            })
        );
        assert_eq!(
            parse("H090"),
            heading(HeadingArgs {
                heading: Some(90.0),
                ..HeadingArgs::default()
            })
        );
        assert_eq!(
            parse("L20D"),
            heading(HeadingArgs {
                left_degrees: Some(20.0),
                ..HeadingArgs::default()
            })
        );
        assert_eq!(
            parse("R270"),
            heading(HeadingArgs {
                heading: Some(270.0),
                turn: TurnMethod::Right,
                ..HeadingArgs::default()
            })
        );
        assert_eq!(
            parse("T30R"),
            heading(HeadingArgs {
                right_degrees: Some(30.0),
                ..HeadingArgs::default()
            })
        );
        assert_eq!(parse("L"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("HABC"), Err(SimError::InvalidCommandSyntax));
    }

    #[test]
    fn s_family() {
        assert_eq!(
            parse("S"),
            Ok(Command::Speed {
                speed: 0.0,
                after_altitude: false
            })
        );
        assert_eq!(parse("SMIN"), Ok(Command::SlowestPractical));
        assert_eq!(parse("SMAX"), Ok(Command::MaximumForward));
        assert_eq!(parse("SS"), Ok(Command::SaySpeed));
        assert_eq!(parse("SH"), Ok(Command::SayHeading));
        assert_eq!(parse("SA"), Ok(Command::SayAltitude));
        assert_eq!(
            parse("SQS"),
            Ok(Command::TransponderMode(TransponderMode::Standby))
        );
        assert_eq!(parse("SQ1234"), Ok(Command::Squawk(Squawk(0o1234))));
        assert_eq!(parse("SQ1289"), Err(SimError::InvalidSquawk));
        assert_eq!(
            parse("S210"),
            Ok(Command::Speed {
                speed: 210.0,
                after_altitude: false
            })
        );
        assert_eq!(parse("SQ12"), Err(SimError::InvalidCommandSyntax));
    }

    #[test]
    fn t_family() {
        assert_eq!(parse("TO"), Ok(Command::ContactTower));
        assert_eq!(
            parse("TS180"),
            Ok(Command::Speed {
                speed: 180.0,
                after_altitude: true
            })
        );
        assert_eq!(parse("T"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("TX"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("TQ10"), Err(SimError::InvalidCommandSyntax));
    }

    #[test]
    fn everything_else_is_a_syntax_error() {
        assert_eq!(parse("X"), Ok(Command::Delete));
        assert_eq!(parse("XYZ"), Ok(Command::Delete));
        assert_eq!(parse("ZZZ"), Err(SimError::InvalidCommandSyntax));
        assert_eq!(parse("ÄÖ"), Err(SimError::InvalidCommandSyntax));
    }
}
