//! bench-host library entry point.
//!
//! Holds the adapters that touch real hardware (serial ports, the USB relay
//! board, the config file) and the use cases the `benchctl` binary drives.
//! Integration tests in `tests/` and `main.rs` share this module tree.

pub mod application;
pub mod infrastructure;
