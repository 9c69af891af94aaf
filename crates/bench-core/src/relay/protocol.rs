//! Wire format of the DCT Tech USB-HID relay board.
//!
//! The board has no interrupt endpoints worth talking about: everything goes
//! through HID feature reports on the control endpoint.
//!
//! # Status report (GET_REPORT, 8 bytes)
//!
//! ```text
//!  0 1 2 3 4 | 5 6 | 7
//! ┌──────────┬─────┬────────────┐
//! │  serial  │  ?  │ relay mask │
//! └──────────┴─────┴────────────┘
//! ```
//!
//! Bit *i − 1* of the relay mask is the energised flag of relay *i*.
//!
//! # Command report (SET_REPORT, 8 bytes, zero padded)
//!
//! | opcode | argument          | meaning              |
//! |--------|-------------------|----------------------|
//! | `0xFF` | relay number      | energise one relay   |
//! | `0xFD` | relay number      | release one relay    |
//! | `0xFE` | –                 | energise all relays  |
//! | `0xFC` | –                 | release all relays   |
//! | `0xFA` | up to 5 bytes     | write serial number  |

use std::fmt;

use serde::Serialize;

// ── USB identity ──────────────────────────────────────────────────────────────

pub const VENDOR_ID: u16 = 0x16C0;
pub const PRODUCT_ID: u16 = 0x05DF;
pub const MANUFACTURER: &str = "www.dcttech.com";
pub const PRODUCT_PREFIX: &str = "USBRelay";

/// The firmware never addresses more than eight relays.
pub const MAX_RELAYS: u8 = 8;

// ── Control transfer encoding ─────────────────────────────────────────────────

/// bmRequestType: class | device | device-to-host.
pub const REQUEST_TYPE_IN: u8 = 0xA0;
/// bmRequestType: class | device | host-to-device.
pub const REQUEST_TYPE_OUT: u8 = 0x20;

pub const HID_GET_REPORT: u8 = 0x01;
pub const HID_SET_REPORT: u8 = 0x09;
pub const HID_REPORT_TYPE_FEATURE: u8 = 0x03;

/// The board exposes a single feature report.
pub const STATUS_REPORT_ID: u8 = 0x00;

pub const REPORT_LEN: usize = 8;
pub const SERIAL_LEN: usize = 5;
pub const STATE_BYTE: usize = 7;

// ── Opcodes ───────────────────────────────────────────────────────────────────

pub const OP_RELAY_ON: u8 = 0xFF;
pub const OP_RELAY_OFF: u8 = 0xFD;
pub const OP_ALL_ON: u8 = 0xFE;
pub const OP_ALL_OFF: u8 = 0xFC;
pub const OP_SET_SERIAL: u8 = 0xFA;

/// wValue of a feature-report transfer: report type in the high byte, report
/// id in the low byte.
pub fn feature_report_value(report_id: u8) -> u16 {
    (u16::from(HID_REPORT_TYPE_FEATURE) << 8) | u16::from(report_id)
}

// ── Relay mask ────────────────────────────────────────────────────────────────

/// Raw energised mask as reported by the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct RelayState(pub u8);

impl RelayState {
    /// Raw energised flag of relay `relay` (1-based).  Relays outside
    /// `1..=8` read as released.
    pub fn is_energized(self, relay: u8) -> bool {
        match relay {
            1..=MAX_RELAYS => self.0 & (1 << (relay - 1)) != 0,
            _ => false,
        }
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08b}", self.0)
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// One SET_REPORT command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    Energize(u8),
    Release(u8),
    EnergizeAll,
    ReleaseAll,
    /// Only the first [`SERIAL_LEN`] bytes are sent.
    SetSerial(Vec<u8>),
}

impl RelayCommand {
    /// Single-relay command energising (`on`) or releasing relay `relay`.
    pub fn single(relay: u8, on: bool) -> Self {
        if on {
            RelayCommand::Energize(relay)
        } else {
            RelayCommand::Release(relay)
        }
    }

    /// Broadcast command.
    pub fn all(on: bool) -> Self {
        if on {
            RelayCommand::EnergizeAll
        } else {
            RelayCommand::ReleaseAll
        }
    }

    /// The zero-padded 8-byte payload.
    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let mut report = [0u8; REPORT_LEN];
        match self {
            RelayCommand::Energize(n) => {
                report[0] = OP_RELAY_ON;
                report[1] = *n;
            }
            RelayCommand::Release(n) => {
                report[0] = OP_RELAY_OFF;
                report[1] = *n;
            }
            RelayCommand::EnergizeAll => report[0] = OP_ALL_ON,
            RelayCommand::ReleaseAll => report[0] = OP_ALL_OFF,
            RelayCommand::SetSerial(serial) => {
                report[0] = OP_SET_SERIAL;
                let n = serial.len().min(SERIAL_LEN);
                report[1..1 + n].copy_from_slice(&serial[..n]);
            }
        }
        report
    }
}

// ── Status report ─────────────────────────────────────────────────────────────

/// A parsed GET_REPORT response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayStatus {
    pub serial: String,
    pub state: RelayState,
}

impl RelayStatus {
    /// Parses an 8-byte status report.  Returns `None` if `report` is shorter
    /// than [`REPORT_LEN`].
    pub fn parse(report: &[u8]) -> Option<Self> {
        if report.len() < REPORT_LEN {
            return None;
        }
        Some(Self {
            serial: decode_serial(&report[..SERIAL_LEN]),
            state: RelayState(report[STATE_BYTE]),
        })
    }
}

/// Serial number bytes with trailing NULs stripped, as UTF-8.  Bytes that are
/// not valid UTF-8 are rendered as lowercase hex of the full field instead.
pub fn decode_serial(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    match std::str::from_utf8(&raw[..end]) {
        Ok(text) => text.to_string(),
        Err(_) => raw.iter().map(|b| format!("{b:02x}")).collect(),
    }
}

// ── Device identity ───────────────────────────────────────────────────────────

/// Number of relays encoded in a product string such as `"USBRelay8"`.
///
/// Returns `None` when the prefix is missing, the suffix is not a number, or
/// the count is outside `1..=8`.
pub fn relay_count_from_product(product: &str) -> Option<u8> {
    let suffix = product.strip_prefix(PRODUCT_PREFIX)?;
    let count: u8 = suffix.trim().parse().ok()?;
    (1..=MAX_RELAYS).contains(&count).then_some(count)
}

/// `true` if the USB descriptors belong to a supported relay board.
pub fn is_relay_device(
    vendor_id: u16,
    product_id: u16,
    manufacturer: Option<&str>,
    product: Option<&str>,
) -> bool {
    vendor_id == VENDOR_ID
        && product_id == PRODUCT_ID
        && manufacturer == Some(MANUFACTURER)
        && product.is_some_and(|p| p.starts_with(PRODUCT_PREFIX))
}
