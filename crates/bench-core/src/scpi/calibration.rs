//! Set-point calibration and range-checked setting commands.
//!
//! Some supplies regulate a little off their programmed set point.  A
//! [`SetpointCalibration`] corrects the requested value before it is sent;
//! the correction constants are measured per unit and supplied from
//! configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::channel::CommandChannel;
use super::error_register::ErrorRegister;
use super::InstrumentError;
use crate::transport::TransportStream;

/// Maps a requested set point to the value actually programmed.
pub trait SetpointCalibration: Send + Sync + fmt::Debug {
    fn apply(&self, value: f64) -> f64;
}

/// Identity correction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Uncalibrated;

impl SetpointCalibration for Uncalibrated {
    fn apply(&self, value: f64) -> f64 {
        value
    }
}

/// `round3(v + v * slope + offset)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearCalibration {
    pub offset: f64,
    pub slope: f64,
}

impl LinearCalibration {
    pub fn new(offset: f64, slope: f64) -> Self {
        Self { offset, slope }
    }
}

impl SetpointCalibration for LinearCalibration {
    fn apply(&self, value: f64) -> f64 {
        round3(value + value * self.slope + self.offset)
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Per-channel corrections.  Channels without an entry are uncalibrated.
///
/// Cloning is cheap: strategies are shared.
#[derive(Debug, Clone, Default)]
pub struct ChannelCalibration {
    channels: BTreeMap<u8, Arc<dyn SetpointCalibration>>,
}

impl ChannelCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `calibration` for `channel`, replacing any previous entry.
    pub fn with_channel(
        mut self,
        channel: u8,
        calibration: impl SetpointCalibration + 'static,
    ) -> Self {
        self.channels.insert(channel, Arc::new(calibration));
        self
    }

    pub fn apply(&self, channel: u8, value: f64) -> f64 {
        match self.channels.get(&channel) {
            Some(calibration) => calibration.apply(value),
            None => value,
        }
    }

    pub fn is_calibrated(&self, channel: u8) -> bool {
        self.channels.contains_key(&channel)
    }
}

/// Ensures `channel` lies in `[1, count]`.
///
/// # Errors
///
/// Returns [`InstrumentError::ChannelOutOfRange`].
pub fn check_channel(channel: u8, count: u8) -> Result<(), InstrumentError> {
    if (1..=count).contains(&channel) {
        Ok(())
    } else {
        Err(InstrumentError::ChannelOutOfRange { channel, count })
    }
}

/// A parameterised setting command such as `CH{channel}:VOLTage {value}`.
///
/// The channel is range-checked before any I/O, the value goes through the
/// channel's calibration, and the command is sent with an error-queue check.
#[derive(Debug)]
pub struct SetpointCommand {
    template: String,
    channel_count: u8,
    calibration: ChannelCalibration,
}

impl SetpointCommand {
    pub fn new(template: impl Into<String>, channel_count: u8) -> Self {
        Self {
            template: template.into(),
            channel_count,
            calibration: ChannelCalibration::new(),
        }
    }

    pub fn with_calibration(mut self, calibration: ChannelCalibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Renders the command text for `channel` and the calibrated `value`.
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentError::ChannelOutOfRange`].
    pub fn render(&self, channel: u8, value: f64) -> Result<String, InstrumentError> {
        check_channel(channel, self.channel_count)?;
        let corrected = self.calibration.apply(channel, value);
        Ok(self
            .template
            .replace("{channel}", &channel.to_string())
            .replace("{value}", &corrected.to_string()))
    }

    /// Renders and sends the command, then checks the error queue.
    ///
    /// # Errors
    ///
    /// - [`InstrumentError::ChannelOutOfRange`] before any I/O.
    /// - Anything [`ErrorRegister::checked_send`] raises.
    pub fn send<T: TransportStream>(
        &self,
        channel: &mut CommandChannel<T>,
        errors: &ErrorRegister,
        output: u8,
        value: f64,
    ) -> Result<(), InstrumentError> {
        let command = self.render(output, value)?;
        debug!(
            output,
            requested = value,
            calibrated = self.calibration.is_calibrated(output),
            %command,
            "programming set point"
        );
        errors.checked_send(channel, &command)
    }
}
