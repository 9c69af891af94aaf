//! Serial-port adapter for text instruments.
//!
//! Wraps a `serialport` handle as a [`TransportStream`].  The port is opened
//! 8N1 with a read timeout; a read that times out is reported as a zero-byte
//! read, which is what the line framer counts as "idle".

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use bench_core::transport::{TransportError, TransportStream};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, info};

/// Default baud rate of the bench instruments.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default per-read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Everything needed to open one serial instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl SerialSettings {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// An open serial port.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Opens the port described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the port cannot be opened.
    pub fn open(settings: &SerialSettings) -> Result<Self, TransportError> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| TransportError::Io(e.into()))?;
        info!(
            port = %settings.port,
            baud = settings.baud_rate,
            timeout_ms = settings.read_timeout.as_millis() as u64,
            "serial port opened"
        );
        Ok(Self {
            port: Some(port),
            name: settings.port.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

impl TransportStream for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.port()?.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!(port = %self.name, "serial port closed");
        }
    }
}

/// Names of the serial ports present on this machine.
///
/// # Errors
///
/// Returns [`TransportError::Io`] if the OS enumeration fails.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    let ports = serialport::available_ports().map_err(|e| TransportError::Io(e.into()))?;
    debug!(count = ports.len(), "serial ports enumerated");
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = SerialSettings::new("/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.read_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_open_missing_port_is_io_error() {
        let settings = SerialSettings::new("/dev/benchlink-no-such-port");
        assert!(matches!(
            SerialTransport::open(&settings),
            Err(TransportError::Io(_))
        ));
    }
}
