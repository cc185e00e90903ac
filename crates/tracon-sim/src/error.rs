//! Error types for the simulation engine.
//!
//! Display strings are stable: they cross the RPC boundary verbatim and
//! clients match on them.

/// Domain, authorization, and syntax errors raised by [`Sim`] operations.
///
/// [`Sim`]: crate::sim::Sim
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    // -- Authorization ------------------------------------------------------
    /// A human already occupies the position.
    #[error("Controller with that callsign already signed in")]
    ControllerAlreadySignedIn,

    /// The position is staffed by a virtual controller.
    #[error("Invalid controller")]
    InvalidController,

    /// The position does not exist or is not signed on.
    #[error("No controller with that callsign")]
    NoController,

    /// Another position owns launch control.
    #[error("Not signed in to the launch controller position")]
    NotLaunchController,

    // -- Aircraft lookup and ownership ----------------------------------------
    /// No aircraft has the given callsign.
    #[error("No aircraft exists with specified callsign")]
    NoAircraftForCallsign,

    /// The caller neither tracks nor controls the aircraft.
    #[error("Another controller is already tracking the aircraft")]
    OtherControllerHasTrack,

    /// A generated aircraft collides with an existing callsign.
    #[error("Duplicate aircraft ID")]
    DuplicateCallsign,

    /// The flight plan carries a CID that is already in use or malformed.
    #[error("Duplicate CID")]
    DuplicateCid,

    // -- Commands -------------------------------------------------------------
    /// A command token did not parse.
    #[error("Invalid command syntax")]
    InvalidCommandSyntax,

    /// Assigned altitude is outside the aircraft's envelope.
    #[error("Invalid altitude")]
    InvalidAltitude,

    /// Assigned heading is not in 1..=360.
    #[error("Invalid heading")]
    InvalidHeading,

    /// The pilot cannot comply.
    #[error("Unable")]
    UnableCommand,

    /// The fix is unknown.
    #[error("Invalid fix")]
    InvalidFix,

    /// The fix is not on the aircraft's route.
    #[error("Fix not in aircraft's route")]
    FixNotInRoute,

    /// The approach is unknown at the arrival airport.
    #[error("Unknown approach")]
    UnknownApproach,

    /// Clearance for an approach other than the expected one.
    #[error("Cleared for unexpected approach")]
    ClearedForUnexpectedApproach,

    /// The aircraft was not cleared for an approach.
    #[error("Aircraft has not been cleared for an approach")]
    NotClearedForApproach,

    /// The squawk code is not four octal digits.
    #[error("Illegal beacon code")]
    InvalidSquawk,

    // -- Tracks ---------------------------------------------------------------
    /// The aircraft is already tracked.
    #[error("Track is already active")]
    TrackIsActive,

    /// The aircraft is not tracked.
    #[error("Track is not active")]
    TrackIsNotActive,

    /// A handoff is already outstanding.
    #[error("Track is currently being handed off")]
    TrackIsBeingHandedOff,

    /// A point-out is already outstanding.
    #[error("Track is currently being pointed out")]
    TrackIsPointedOut,

    /// The caller is not the handoff recipient.
    #[error("Aircraft not being handed off to current controller")]
    NotBeingHandedOffToMe,

    /// The caller is not the point-out recipient.
    #[error("Aircraft not being pointed out to current controller")]
    NotPointedOutToMe,

    /// Scratchpad text longer than four characters.
    #[error("Illegal scratchpad")]
    IllegalScratchpad,

    /// The held departure has already been released.
    #[error("Aircraft already released")]
    AircraftAlreadyReleased,

    // -- Restriction areas ----------------------------------------------------
    /// Every restriction-area slot is in use.
    #[error("Too many restriction areas specified")]
    TooManyRestrictionAreas,

    /// Index is out of range or names a deleted area.
    #[error("Invalid restriction area index")]
    InvalidRestrictionAreaIndex,

    // -- Generation -----------------------------------------------------------
    /// The airport is not part of the scenario.
    #[error("Unknown airport")]
    UnknownAirport,

    /// The runway has no departures configured.
    #[error("Unknown runway")]
    UnknownRunway,

    /// No arrival flow serves the requested airport.
    #[error("Unable to find a valid arrival")]
    NoValidArrivalFound,

    /// Every CID partition is exhausted.
    #[error("no more CIDs available")]
    NoMoreCids,

    // -- Arguments ------------------------------------------------------------
    /// A request argument is out of range.
    #[error("Invalid argument")]
    InvalidArgument,
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}
