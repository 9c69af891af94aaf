//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module handles:
//!
//! - Locating the TOML configuration file (`--config`, `$BENCHLINK_CONFIG`,
//!   or the platform-appropriate directory).
//! - Parsing it with defaults for everything but the relay channel map.
//! - Converting its sections into `bench-core` types (framer, error register,
//!   relay configuration, calibration).

pub mod config;
