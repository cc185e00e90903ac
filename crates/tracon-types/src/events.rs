//! State-change notifications delivered to connected controllers.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{EventType, LeaderLineDirection, RadioTransmissionType};
use crate::ids::{Callsign, Tcp};

/// A single notification posted to the sim's event stream.
///
/// Which fields are set depends on [`EventType`]: coordination events carry
/// both controllers and a callsign, radio transmissions carry the callsign,
/// the addressed controller, and the text, and status messages carry only
/// text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Kind of event.
    pub event_type: EventType,
    /// Aircraft the event concerns.
    pub callsign: Option<Callsign>,
    /// Originating position.
    pub from_controller: Option<Tcp>,
    /// Receiving position.
    pub to_controller: Option<Tcp>,
    /// Human-readable text.
    pub message: String,
    /// For radio transmissions, the kind of transmission.
    pub radio_transmission_type: Option<RadioTransmissionType>,
    /// For leader line events, the new direction.
    pub leader_line_direction: Option<LeaderLineDirection>,
}

impl Event {
    /// An event of the given type with every optional field empty.
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            callsign: None,
            from_controller: None,
            to_controller: None,
            message: String::new(),
            radio_transmission_type: None,
            leader_line_direction: None,
        }
    }

    /// A status line with no aircraft or controller attached.
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::new(EventType::StatusMessage)
        }
    }

    /// A coordination event between two positions about one aircraft.
    pub const fn coordination(
        event_type: EventType,
        callsign: Callsign,
        from: Option<Tcp>,
        to: Option<Tcp>,
    ) -> Self {
        Self {
            event_type,
            callsign: Some(callsign),
            from_controller: from,
            to_controller: to,
            message: String::new(),
            radio_transmission_type: None,
            leader_line_direction: None,
        }
    }
}

/// One pilot transmission, addressed to a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RadioTransmission {
    /// Position the pilot is talking to.
    pub controller: Option<Tcp>,
    /// What the pilot says.
    pub message: String,
    /// Contact, readback, or unexpected.
    pub transmission_type: RadioTransmissionType,
}

impl RadioTransmission {
    /// A readback addressed to `controller`.
    pub fn readback(controller: Option<Tcp>, message: impl Into<String>) -> Self {
        Self {
            controller,
            message: message.into(),
            transmission_type: RadioTransmissionType::Readback,
        }
    }

    /// An initial check-in addressed to `controller`.
    pub fn contact(controller: Option<Tcp>, message: impl Into<String>) -> Self {
        Self {
            controller,
            message: message.into(),
            transmission_type: RadioTransmissionType::Contact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_has_only_text() {
        let e = Event::status("2J has signed on.");
        assert_eq!(e.event_type, EventType::StatusMessage);
        assert!(e.callsign.is_none());
        assert_eq!(e.message, "2J has signed on.");
    }

    #[test]
    fn coordination_event_carries_both_positions() {
        let e = Event::coordination(
            EventType::PointOut,
            Callsign::from("AAL1"),
            Some(Tcp::from("2J")),
            Some(Tcp::from("4P")),
        );
        assert_eq!(e.from_controller.as_ref().map(Tcp::as_str), Some("2J"));
        assert_eq!(e.to_controller.as_ref().map(Tcp::as_str), Some("4P"));
    }
}
