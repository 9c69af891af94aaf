//! Application layer use cases for `benchctl`.
//!
//! # What is the "application" layer? (for beginners)
//!
//! Use cases in this layer take one command from the user, drive the
//! protocol objects from `bench-core` to carry it out, and hand back a
//! serializable outcome.  They:
//!
//! - **Depend on abstractions** (`TransportStream`, `FeatureReportDevice`)
//!   rather than on `serialport` or `nusb`, so tests run them against the
//!   in-memory mocks.
//! - **Contain no OS calls**: opening ports and devices is the binary's job.
//!
//! # Sub-modules
//!
//! - **`instrument_session`** – Text-instrument commands: raw queries,
//!   checked writes, status decoding, timer groups and calibrated set points.
//! - **`relay_control`** – Relay board commands addressed by number, name
//!   or `all`.

pub mod instrument_session;
pub mod relay_control;
