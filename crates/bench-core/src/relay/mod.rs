//! USB-HID relay board driver.
//!
//! - [`protocol`] – report layout, opcodes and descriptor matching.
//! - [`config`] – channel names, inversion and wiring.
//! - [`controller`] – [`RelayController`], the stateful driver.
//!
//! # Selectors
//!
//! Every relay operation takes a [`RelaySelector`]: a relay number, a
//! configured channel name, or `"all"`.  Numbers address the raw relay and
//! use the configuration's `default_invert`; names carry the channel's own
//! inversion and wiring.

pub mod config;
pub mod controller;
pub mod protocol;

pub use config::{Alias, RelayChannel, RelayConfig, RelayConfigSource, Wiring};
pub use controller::{RelayController, RelayReading};
pub use protocol::{RelayCommand, RelayState, RelayStatus};

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised by the relay driver.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("transport fault: {0}")]
    Transport(#[from] TransportError),

    /// A relay number outside `[1, num_relays]`.
    #[error("Index {relay} is outside range [1..{max}]")]
    OutOfRange { relay: i64, max: u8 },

    /// Neither a number, a configured name, nor (where allowed) `"all"`.
    #[error("'{0}' is not a valid relay descriptor")]
    InvalidSelector(String),

    /// No relay configuration was supplied.
    #[error("relay configuration is missing or empty")]
    ConfigMissing,

    #[error("invalid relay configuration: {0}")]
    InvalidConfig(String),

    /// The product string does not name a supported board.
    #[error("unsupported relay board product {0:?}")]
    UnsupportedProduct(String),

    /// `is_connected` on a relay with no wiring classification.
    #[error("relay {0} has no wiring classification (NO/NC)")]
    WiringUnknown(u8),

    #[error("status report too short: expected {expected} bytes, got {got}")]
    ShortReport { expected: usize, got: usize },

    #[error("relay controller is closed")]
    Closed,
}

/// Addresses one relay, a named channel, or every relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelaySelector {
    All,
    Number(i64),
    Alias(String),
}

impl FromStr for RelaySelector {
    type Err = std::convert::Infallible;

    /// `"all"` (any case) is the broadcast selector, anything that parses as
    /// an integer is a relay number, everything else is an alias name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            Ok(RelaySelector::All)
        } else if let Ok(n) = s.parse::<i64>() {
            Ok(RelaySelector::Number(n))
        } else {
            Ok(RelaySelector::Alias(s.to_string()))
        }
    }
}

impl From<u8> for RelaySelector {
    fn from(relay: u8) -> Self {
        RelaySelector::Number(i64::from(relay))
    }
}

impl From<&str> for RelaySelector {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(selector) => selector,
            Err(never) => match never {},
        }
    }
}

impl From<String> for RelaySelector {
    fn from(s: String) -> Self {
        RelaySelector::from(s.as_str())
    }
}

impl fmt::Display for RelaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaySelector::All => f.write_str("all"),
            RelaySelector::Number(n) => write!(f, "{n}"),
            RelaySelector::Alias(name) => f.write_str(name),
        }
    }
}
