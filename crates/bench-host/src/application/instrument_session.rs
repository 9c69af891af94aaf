//! InstrumentSession: text-instrument commands on top of a
//! [`CommandChannel`].
//!
//! A session bundles the channel with the pieces every command needs: the
//! error register, the status query, the channel count and the set-point
//! calibration strategy.  It is generic over [`TransportStream`] so tests can
//! drive it with a scripted stream.

use bench_core::scpi::{
    timer_query, ChannelCalibration, CommandChannel, DecodedStatus, ErrorRegister,
    InstrumentError, SetpointCommand, StatusWord, TimerGroup,
};
use bench_core::transport::TransportStream;
use serde::Serialize;
use tracing::info;

/// An instrument command.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentAction {
    Identify,
    Query(String),
    Write(String),
    Checked(String),
    Status,
    Timer { channel: u8, group: u8 },
    Setpoint { template: String, channel: u8, value: f64 },
}

/// What an instrument command produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentOutcome {
    Response { text: String },
    Status { raw: String, decoded: DecodedStatus },
    Timer(TimerGroup),
    Done,
}

/// One connected text instrument.
pub struct InstrumentSession<T: TransportStream> {
    channel: CommandChannel<T>,
    errors: ErrorRegister,
    status_query: String,
    channel_count: u8,
    calibration: ChannelCalibration,
}

impl<T: TransportStream> InstrumentSession<T> {
    pub fn new(channel: CommandChannel<T>) -> Self {
        Self {
            channel,
            errors: ErrorRegister::new(),
            status_query: "SYSTem:STATus?".to_string(),
            channel_count: 2,
            calibration: ChannelCalibration::new(),
        }
    }

    pub fn with_error_register(mut self, errors: ErrorRegister) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_status_query(mut self, query: impl Into<String>) -> Self {
        self.status_query = query.into();
        self
    }

    pub fn with_channel_count(mut self, count: u8) -> Self {
        self.channel_count = count;
        self
    }

    /// Installs the set-point correction strategy per channel.
    pub fn with_calibration(mut self, calibration: ChannelCalibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Runs one action.
    ///
    /// # Errors
    ///
    /// Propagates every [`InstrumentError`].  Channel range errors are raised
    /// before any I/O.
    pub fn run(&mut self, action: InstrumentAction) -> Result<InstrumentOutcome, InstrumentError> {
        match action {
            InstrumentAction::Identify => Ok(InstrumentOutcome::Response {
                text: self.channel.identify()?,
            }),
            InstrumentAction::Query(command) => Ok(InstrumentOutcome::Response {
                text: self.channel.query(&command)?,
            }),
            InstrumentAction::Write(command) => {
                self.channel.write(&command)?;
                Ok(InstrumentOutcome::Done)
            }
            InstrumentAction::Checked(command) => {
                self.errors.checked_send(&mut self.channel, &command)?;
                Ok(InstrumentOutcome::Done)
            }
            InstrumentAction::Status => {
                let raw = self.channel.query(&self.status_query)?;
                let word = StatusWord::decode(&raw)?;
                Ok(InstrumentOutcome::Status {
                    raw,
                    decoded: word.decoded(),
                })
            }
            InstrumentAction::Timer { channel, group } => {
                bench_core::scpi::check_channel(channel, self.channel_count)?;
                let text = self.channel.query(&timer_query(channel, group))?;
                Ok(InstrumentOutcome::Timer(TimerGroup::parse(&text)?))
            }
            InstrumentAction::Setpoint {
                template,
                channel,
                value,
            } => {
                let command = SetpointCommand::new(template, self.channel_count)
                    .with_calibration(self.calibration.clone());
                command.send(&mut self.channel, &self.errors, channel, value)?;
                info!(channel, value, "set point programmed");
                Ok(InstrumentOutcome::Done)
            }
        }
    }

    /// Closes the channel.
    pub fn close(&mut self) {
        self.channel.close();
    }
}
