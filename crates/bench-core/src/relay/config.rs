//! Relay channel configuration: which relay drives what, and how.
//!
//! A configuration is deserialised from the `[relay]` table of the host's
//! config file:
//!
//! ```toml
//! [relay]
//! default_invert = false
//!
//! [[relay.channel]]
//! relay = 1
//! name = "dut_power"
//! wiring = "NO"
//!
//! [[relay.channel]]
//! relay = 3
//! name = "load_bypass"
//! invert = true
//! wiring = "NC"
//! ```
//!
//! and validated once into an immutable [`RelayConfig`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::protocol::MAX_RELAYS;
use super::RelayError;

/// How the load is connected across the relay contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Wiring {
    /// Load circuit is closed while the coil is energised.
    #[serde(rename = "NO")]
    NormallyOpen,
    /// Load circuit is closed while the coil is released.
    #[serde(rename = "NC")]
    NormallyClosed,
}

/// One configured relay channel, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayChannel {
    pub relay: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub invert: Option<bool>,
    #[serde(default)]
    pub wiring: Option<Wiring>,
}

/// Unvalidated configuration, straight from serde.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfigSource {
    #[serde(default)]
    pub default_invert: bool,
    #[serde(default)]
    pub channel: Vec<RelayChannel>,
}

/// What an alias name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alias {
    pub relay: u8,
    pub invert: Option<bool>,
    pub wiring: Option<Wiring>,
}

/// Validated relay configuration.
///
/// Indexed by relay number, with a secondary name index.  Relay numbers are
/// checked against `1..=8` here; the board's actual relay count is checked
/// when a controller is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    default_invert: bool,
    channels: BTreeMap<u8, RelayChannel>,
    names: BTreeMap<String, u8>,
}

impl RelayConfig {
    /// Validates a list of channels.
    ///
    /// # Errors
    ///
    /// - [`RelayError::ConfigMissing`] when `channels` is empty.
    /// - [`RelayError::InvalidConfig`] for a relay outside `1..=8`, a
    ///   duplicate relay or name, a blank name, or a name that would be
    ///   read as a selector (`"all"` or a number).
    ///
    /// Names are stored trimmed.
    pub fn from_channels(
        default_invert: bool,
        channels: impl IntoIterator<Item = RelayChannel>,
    ) -> Result<Self, RelayError> {
        let mut by_relay = BTreeMap::new();
        let mut names = BTreeMap::new();

        for mut channel in channels {
            if !(1..=MAX_RELAYS).contains(&channel.relay) {
                return Err(RelayError::InvalidConfig(format!(
                    "relay {} is outside 1..={MAX_RELAYS}",
                    channel.relay
                )));
            }
            // selectors are trimmed before lookup, so names are too
            channel.name = channel.name.map(|name| name.trim().to_string());
            if let Some(name) = &channel.name {
                if name.is_empty() {
                    return Err(RelayError::InvalidConfig(format!(
                        "relay {} has a blank name",
                        channel.relay
                    )));
                }
                if name.eq_ignore_ascii_case("all") || name.parse::<i64>().is_ok() {
                    return Err(RelayError::InvalidConfig(format!(
                        "channel name {name:?} clashes with a relay selector"
                    )));
                }
                if names.insert(name.clone(), channel.relay).is_some() {
                    return Err(RelayError::InvalidConfig(format!(
                        "channel name {name:?} is used twice"
                    )));
                }
            }
            let relay = channel.relay;
            if by_relay.insert(relay, channel).is_some() {
                return Err(RelayError::InvalidConfig(format!(
                    "relay {relay} is configured twice"
                )));
            }
        }

        if by_relay.is_empty() {
            return Err(RelayError::ConfigMissing);
        }

        Ok(Self {
            default_invert,
            channels: by_relay,
            names,
        })
    }

    pub fn default_invert(&self) -> bool {
        self.default_invert
    }

    /// Configured channels in relay order.
    pub fn channels(&self) -> impl Iterator<Item = &RelayChannel> {
        self.channels.values()
    }

    pub fn channel(&self, relay: u8) -> Option<&RelayChannel> {
        self.channels.get(&relay)
    }

    /// Looks up an alias by channel name.
    pub fn alias(&self, name: &str) -> Option<Alias> {
        let relay = *self.names.get(name)?;
        let channel = self.channels.get(&relay)?;
        Some(Alias {
            relay,
            invert: channel.invert,
            wiring: channel.wiring,
        })
    }

    pub fn name_of(&self, relay: u8) -> Option<&str> {
        self.channels.get(&relay)?.name.as_deref()
    }

    pub fn wiring_of(&self, relay: u8) -> Option<Wiring> {
        self.channels.get(&relay)?.wiring
    }

    /// Highest configured relay number.
    pub fn max_relay(&self) -> u8 {
        self.channels.keys().next_back().copied().unwrap_or(0)
    }
}

impl TryFrom<RelayConfigSource> for RelayConfig {
    type Error = RelayError;

    fn try_from(source: RelayConfigSource) -> Result<Self, Self::Error> {
        RelayConfig::from_channels(source.default_invert, source.channel)
    }
}
