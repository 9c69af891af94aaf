//! Text command/response protocol shared by the serial instruments.
//!
//! # Layering
//!
//! ```text
//! driver ──send──► CommandChannel ──write──► TransportStream
//!                        │
//!                        └──read_frame──► LineFramer ──read──► TransportStream
//!
//! ErrorRegister / StatusWord / TimerGroup interpret the returned text.
//! ```
//!
//! Framing anomalies (silence, garbage, a missing terminator) never surface
//! as errors: they come back as the empty string.  Device-reported errors,
//! malformed responses and range violations are raised as
//! [`InstrumentError`].

pub mod calibration;
pub mod channel;
pub mod error_register;
pub mod framing;
pub mod status;
pub mod timer;

pub use calibration::{
    check_channel, ChannelCalibration, LinearCalibration, SetpointCalibration, SetpointCommand,
    Uncalibrated,
};
pub use channel::{CommandChannel, IDN_QUERY};
pub use error_register::{ErrorRegister, ErrorStatus};
pub use framing::{decode_escaped, LineFramer, ResponseFrame};
pub use status::{
    Channel, DecodedStatus, DisplayMode, OperationMode, RegulationMode, StatusParseError,
    StatusWord, Switch,
};
pub use timer::{timer_query, TimerGroup};

use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised by the text-instrument protocol layer.
#[derive(Debug, Error)]
pub enum InstrumentError {
    /// The channel failed underneath us.
    #[error("transport fault: {0}")]
    Transport(#[from] TransportError),

    /// The instrument reported a non-zero code on its error queue.
    #[error("Error Code: {code} -> {message}")]
    Device { code: String, message: String },

    /// The instrument answered, but not in the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A status word could not be decoded.
    #[error(transparent)]
    Status(#[from] StatusParseError),

    /// A channel number outside `[1, count]`; raised before any I/O.
    #[error("Channel # must be an integer 1 - {count}")]
    ChannelOutOfRange { channel: u8, count: u8 },

    /// The command cannot be sent as plain ASCII text.
    #[error("command is not plain ASCII: {0:?}")]
    InvalidCommand(String),

    /// The channel has been closed.
    #[error("instrument channel is closed")]
    Closed,
}
