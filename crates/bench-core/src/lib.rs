//! # bench-core
//!
//! Protocol core for benchlink: line framing and command/response handling
//! for text instruments, and the feature-report protocol of the USB-HID relay
//! board.
//!
//! This crate performs no OS I/O of its own.  Serial ports and USB devices are
//! opened by `bench-host`, which hands them to the drivers here through the
//! traits in [`transport`].
//!
//! # Architecture overview (for beginners)
//!
//! A lab bench typically carries a few programmable instruments (power
//! supplies, multimeters) on serial links and a USB relay board that switches
//! loads in and out.  This crate knows how to talk to both:
//!
//! - **`transport`** – The two device-handle traits (`TransportStream` for
//!   byte streams, `FeatureReportDevice` for USB-HID control transfers) and
//!   scripted mocks of each.
//!
//! - **`scpi`** – The text protocol.  `LineFramer` turns a trickle of bytes
//!   into CR LF terminated responses, `CommandChannel` sends one command and
//!   optionally reads one response, `ErrorRegister` checks the instrument's
//!   error queue after a setting command, and `StatusWord` decodes the power
//!   supply's hex status bitfield.
//!
//! - **`relay`** – The relay board.  `RelayController` reads the board's
//!   8-byte status report, resolves relay numbers and channel names from the
//!   configuration, and drives relays with 8-byte command reports.
//!
//! Everything is synchronous: one operation in flight per device handle.

// Rust looks for each module in a subdirectory of the same name
// (e.g., src/scpi/mod.rs).
pub mod relay;
pub mod scpi;
pub mod transport;

// Re-export the most-used types at the crate root so callers can write
// `bench_core::CommandChannel` instead of `bench_core::scpi::channel::CommandChannel`.
pub use relay::{
    RelayConfig, RelayConfigSource, RelayController, RelayError, RelayReading, RelaySelector,
    RelayState, RelayStatus, Wiring,
};
pub use scpi::{
    CommandChannel, ErrorRegister, ErrorStatus, InstrumentError, LineFramer, ResponseFrame,
    SetpointCommand, StatusWord, TimerGroup,
};
pub use transport::{FeatureReportDevice, TransportError, TransportStream};
