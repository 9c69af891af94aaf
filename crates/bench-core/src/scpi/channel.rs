//! CommandChannel: the synchronous request/response primitive.
//!
//! Every text driver goes through [`CommandChannel::send`]: append `\n`,
//! write once, optionally read one framed response.  There is no retry and no
//! pipelining; the channel owns its transport exclusively.

use tracing::{debug, info};

use super::framing::LineFramer;
use super::InstrumentError;
use crate::transport::TransportStream;

/// Identification query understood by every SCPI instrument.
pub const IDN_QUERY: &str = "*IDN?";

/// A command channel over an exclusively owned [`TransportStream`].
///
/// Dropping the channel closes the transport.
pub struct CommandChannel<T: TransportStream> {
    transport: Option<T>,
    framer: LineFramer,
}

impl<T: TransportStream> CommandChannel<T> {
    /// Wraps an already opened transport using the default framer.
    pub fn new(transport: T) -> Self {
        Self::with_framer(transport, LineFramer::default())
    }

    /// Wraps an already opened transport using a custom framer.
    pub fn with_framer(transport: T, framer: LineFramer) -> Self {
        Self {
            transport: Some(transport),
            framer,
        }
    }

    /// Sends `command` and, if `expect_response`, waits for one response.
    ///
    /// The response is trimmed.  A timeout or malformed frame yields
    /// `Some("")`, indistinguishable from an empty reply.
    ///
    /// # Errors
    ///
    /// - [`InstrumentError::InvalidCommand`] if `command` is not ASCII (no
    ///   bytes are written).
    /// - [`InstrumentError::Transport`] if the write or a read fails.
    /// - [`InstrumentError::Closed`] after [`close`](Self::close).
    pub fn send(
        &mut self,
        command: &str,
        expect_response: bool,
    ) -> Result<Option<String>, InstrumentError> {
        if !command.is_ascii() {
            return Err(InstrumentError::InvalidCommand(command.to_string()));
        }
        let framer = self.framer;
        let transport = self.transport.as_mut().ok_or(InstrumentError::Closed)?;

        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        debug!(command, "sending instrument command");
        transport.write(line.as_bytes())?;

        if !expect_response {
            return Ok(None);
        }
        let frame = framer.read_frame(transport)?;
        debug!(command, response = %frame.text, "instrument response");
        Ok(Some(frame.text.trim().to_string()))
    }

    /// Sends a command that produces no response.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn write(&mut self, command: &str) -> Result<(), InstrumentError> {
        self.send(command, false).map(|_| ())
    }

    /// Sends a query and returns its (possibly empty) response.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn query(&mut self, command: &str) -> Result<String, InstrumentError> {
        Ok(self.send(command, true)?.unwrap_or_default())
    }

    /// Queries the instrument identification string.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn identify(&mut self) -> Result<String, InstrumentError> {
        self.query(IDN_QUERY)
    }

    /// `true` until [`close`](Self::close) has been called.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Closes the transport.  Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            info!("instrument channel closed");
        }
    }
}

impl<T: TransportStream> Drop for CommandChannel<T> {
    fn drop(&mut self) {
        self.close();
    }
}
