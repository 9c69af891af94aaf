//! Timer-group responses of the programmable supply.
//!
//! A timer group is queried as `TIMEr:SET? CH<n>,<group>` and answered as
//! `voltage,current,seconds`.

use serde::Serialize;

use super::InstrumentError;

/// One step of a channel's timer program.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimerGroup {
    pub voltage: f64,
    pub current: f64,
    pub seconds: f64,
}

impl TimerGroup {
    /// Parses a `voltage,current,seconds` response.  Extra fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentError::MalformedResponse`] when fewer than three
    /// fields are present or a field is not a number.
    pub fn parse(response: &str) -> Result<Self, InstrumentError> {
        let malformed = || {
            InstrumentError::MalformedResponse(format!(
                "timer group response {response:?} is not voltage,current,time"
            ))
        };

        let mut fields = response.trim().split(',').map(|f| f.trim().parse::<f64>());
        let mut next = || -> Result<f64, InstrumentError> {
            fields.next().ok_or_else(malformed)?.map_err(|_| malformed())
        };

        Ok(Self {
            voltage: next()?,
            current: next()?,
            seconds: next()?,
        })
    }

    /// Renders the `TIMEr:SET` command that programs this group.
    pub fn to_command(&self, channel: u8, group: u8) -> String {
        format!(
            "TIMEr:SET CH{channel},{group},{},{},{}",
            self.voltage, self.current, self.seconds
        )
    }
}

/// Query for a channel's timer group.
pub fn timer_query(channel: u8, group: u8) -> String {
    format!("TIMEr:SET? CH{channel},{group}")
}
