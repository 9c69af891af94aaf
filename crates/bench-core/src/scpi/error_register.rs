//! Post-command error checking.
//!
//! After a setting command, the instrument's error queue is queried.  The
//! answer looks like:
//!
//! ```text
//! 0  No error
//! 22  Parameter out of range
//! ```
//!
//! i.e. `<code><delimiter><message>` with a two-space delimiter.  Code `0`
//! is the no-error sentinel.

use tracing::{debug, warn};

use super::channel::CommandChannel;
use super::InstrumentError;
use crate::transport::TransportStream;

/// Default error queue query.
pub const DEFAULT_ERROR_QUERY: &str = "SYSTem:ERRor?";

/// Default separator between code and message.
pub const DEFAULT_ERROR_DELIMITER: &str = "  ";

/// Code reported when the queue is empty.
pub const NO_ERROR_CODE: &str = "0";

/// One entry read from the instrument's error queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorStatus {
    pub code: String,
    pub message: String,
}

impl ErrorStatus {
    /// `true` when `code` is the sentinel or empty.
    pub fn is_no_error(&self, sentinel: &str) -> bool {
        self.code.is_empty() || self.code == sentinel
    }
}

/// Issues error-queue queries and turns non-zero codes into
/// [`InstrumentError::Device`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRegister {
    query: String,
    delimiter: String,
    no_error_code: String,
}

impl Default for ErrorRegister {
    fn default() -> Self {
        Self {
            query: DEFAULT_ERROR_QUERY.to_string(),
            delimiter: DEFAULT_ERROR_DELIMITER.to_string(),
            no_error_code: NO_ERROR_CODE.to_string(),
        }
    }
}

impl ErrorRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_no_error_code(mut self, code: impl Into<String>) -> Self {
        self.no_error_code = code.into();
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Splits an error-queue response into code and message.
    ///
    /// A bare sentinel (`"0"`) is accepted without a delimiter.  The message
    /// loses its trailing CR/LF.
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentError::MalformedResponse`] when the delimiter is
    /// missing, which includes the empty response produced by a framing
    /// timeout.
    pub fn parse(&self, response: &str) -> Result<ErrorStatus, InstrumentError> {
        let response = response.trim_end_matches(|c| c == '\r' || c == '\n');
        if response.trim() == self.no_error_code {
            return Ok(ErrorStatus {
                code: self.no_error_code.clone(),
                message: String::new(),
            });
        }

        let (code, message) = response
            .split_once(self.delimiter.as_str())
            .ok_or_else(|| {
                InstrumentError::MalformedResponse(format!(
                    "error query response {response:?} lacks delimiter {:?}",
                    self.delimiter
                ))
            })?;

        Ok(ErrorStatus {
            code: code.trim().to_string(),
            message: message.to_string(),
        })
    }

    /// Runs the error query on `channel`.
    ///
    /// # Errors
    ///
    /// - [`InstrumentError::Device`] for a non-zero code.
    /// - [`InstrumentError::MalformedResponse`] for an unparseable reply.
    /// - Any transport error from the query itself.
    pub fn check<T: TransportStream>(
        &self,
        channel: &mut CommandChannel<T>,
    ) -> Result<(), InstrumentError> {
        let response = channel.query(&self.query)?;
        let status = self.parse(&response)?;
        if status.is_no_error(&self.no_error_code) {
            debug!("error queue clear");
            return Ok(());
        }
        warn!(code = %status.code, message = %status.message, "instrument reported an error");
        Err(InstrumentError::Device {
            code: status.code,
            message: status.message,
        })
    }

    /// Sends `command` without waiting for a response, then checks the error
    /// queue.
    ///
    /// # Errors
    ///
    /// See [`check`](Self::check).
    pub fn checked_send<T: TransportStream>(
        &self,
        channel: &mut CommandChannel<T>,
        command: &str,
    ) -> Result<(), InstrumentError> {
        channel.send(command, false)?;
        self.check(channel)
    }
}
