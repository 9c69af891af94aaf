//! Transport abstractions the protocol layer is written against.
//!
//! Two kinds of device handle exist on a lab bench:
//!
//! - **[`TransportStream`]** – a byte-oriented duplex channel (a serial port,
//!   or anything that looks like one).  Text instruments speak SCPI-style
//!   commands over it.
//! - **[`FeatureReportDevice`]** – a USB-HID device driven exclusively through
//!   feature-report control transfers.  The relay board lives here.
//!
//! Both traits are implemented by OS adapters in `bench-host` and by the mocks
//! in [`mock`], so every piece of protocol logic in this crate can be tested
//! without hardware.
//!
//! # Ownership
//!
//! A handle is owned by exactly one driver.  Every method takes `&mut self`,
//! so there is at most one operation in flight per handle.  `close` must be
//! safe to call more than once.

use thiserror::Error;

pub mod mock;

/// Errors raised by a transport.  These are always fatal for the current
/// operation; nothing in the protocol layer retries them.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An OS-level I/O failure on the channel.
    #[error("I/O error on transport: {0}")]
    Io(#[from] std::io::Error),

    /// The device rejected or failed a transfer (USB stall, disconnect, ...).
    #[error("device transfer failed: {0}")]
    Transfer(String),

    /// The handle has already been closed.
    #[error("transport is closed")]
    Closed,
}

/// A byte-oriented duplex channel.
///
/// `read` is bounded both in size (`buf.len()`) and in time (the adapter's
/// read timeout).  Returning `Ok(0)` means "nothing arrived before the
/// timeout" and is *not* an error.
#[cfg_attr(test, mockall::automock)]
pub trait TransportStream: Send {
    /// Writes all of `bytes` to the channel.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Reads up to `buf.len()` bytes, returning how many were read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Releases the underlying resource.  Idempotent.
    fn close(&mut self);
}

/// A USB-HID device addressed through feature-report control transfers.
#[cfg_attr(test, mockall::automock)]
pub trait FeatureReportDevice: Send {
    /// The device's product string (e.g. `"USBRelay8"`).
    fn product_name(&self) -> Result<String, TransportError>;

    /// Issues a GET_REPORT for `report_id`, filling `buf`.  Returns the number
    /// of bytes the device actually delivered.
    fn get_feature_report(&mut self, report_id: u8, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Issues a SET_REPORT for `report_id` carrying `data`.
    fn set_feature_report(&mut self, report_id: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Releases the underlying resource.  Idempotent.
    fn close(&mut self);
}
