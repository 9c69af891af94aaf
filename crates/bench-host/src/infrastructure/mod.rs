//! Infrastructure layer for benchctl.
//!
//! Contains OS-facing adapters: the serial port, the USB relay board, and
//! file-system configuration.
//!
//! **Dependency rule**: this layer implements the `bench_core` transport
//! traits and MUST NOT be imported by the `application` layer.  Only
//! `main.rs` wires the two together.

pub mod serial;
pub mod storage;
pub mod usb_relay;
