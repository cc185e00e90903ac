//! Strongly-typed identifiers.
//!
//! Aircraft and controller positions are identified by short uppercase
//! strings on the wire (`AAL123`, `2J`), so they are wrapped in string
//! newtypes to keep a callsign from ever being passed where a position is
//! expected. Sessions get a UUID v7 so log lines from one sim can be
//! correlated across restarts of the driver task.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// Generates a transparent newtype wrapper around [`String`].
macro_rules! define_name {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a string value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the wrapped string is empty.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl core::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_id! {
    /// Unique identifier for a running sim session.
    SessionId
}

define_name! {
    /// Aircraft callsign (e.g. `AAL123`, `N123AB`).
    Callsign
}

define_name! {
    /// Terminal control position identifier (e.g. `2J`, `4P`, `INS`).
    ///
    /// Not the network protocol; a named controller position.
    Tcp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_compare_against_str() {
        let tcp = Tcp::new("2J");
        assert_eq!(tcp, "2J");
        assert_eq!(tcp.as_str(), "2J");
        assert!(!tcp.is_empty());
    }

    #[test]
    fn names_serialize_transparently() {
        let cs = Callsign::from("AAL123");
        let json = serde_json::to_string(&cs).ok();
        assert_eq!(json.as_deref(), Some("\"AAL123\""));
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(Callsign::from("JBU4"), 1);
        assert_eq!(map.get("JBU4"), Some(&1));
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
