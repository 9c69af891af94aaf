//! Mock transports for unit and integration testing.
//!
//! Allows tests to script what an instrument "says" and to simulate the relay
//! board's feature reports without a serial port or a USB bus.
//!
//! Both mocks are cheap `Clone` handles over shared state: hand one clone to
//! the driver under test and keep the other to script input and inspect what
//! the driver did.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{FeatureReportDevice, TransportError, TransportStream};
use crate::relay::protocol::{
    OP_ALL_OFF, OP_ALL_ON, OP_RELAY_OFF, OP_RELAY_ON, OP_SET_SERIAL, REPORT_LEN, SERIAL_LEN,
    STATUS_REPORT_ID,
};

// ── Byte stream mock ──────────────────────────────────────────────────────────

/// One scripted outcome of a `read` call.
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Deliver these bytes (split across several reads if the caller's buffer
    /// is smaller).
    Data(Vec<u8>),
    /// Nothing arrives before the timeout: `read` returns `Ok(0)`.
    Idle,
    /// The read fails with an I/O error of this kind.
    Fail(std::io::ErrorKind),
}

#[derive(Debug, Default)]
struct StreamState {
    script: VecDeque<ReadStep>,
    writes: Vec<Vec<u8>>,
    read_calls: u32,
    close_calls: u32,
    closed: bool,
    fail_writes: bool,
}

/// A scripted [`TransportStream`].
///
/// Reads are served from a queue of [`ReadStep`]s; once the queue is empty
/// every read is idle.  Writes are recorded.
#[derive(Debug, Clone, Default)]
pub struct MockStream {
    inner: Arc<Mutex<StreamState>>,
}

impl MockStream {
    /// Creates a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that delivers `chunks` one per read, in order.
    pub fn with_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let stream = Self::new();
        for chunk in chunks {
            stream.push_data(chunk.as_ref());
        }
        stream
    }

    /// Queues raw bytes for delivery.
    pub fn push_data(&self, bytes: &[u8]) {
        self.lock().script.push_back(ReadStep::Data(bytes.to_vec()));
    }

    /// Queues one complete response line, appending CR LF.
    pub fn push_response(&self, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.extend_from_slice(b"\r\n");
        self.push_data(&bytes);
    }

    /// Queues an idle (timed-out) read.
    pub fn push_idle(&self) {
        self.lock().script.push_back(ReadStep::Idle);
    }

    /// Queues a failing read.
    pub fn push_failure(&self, kind: std::io::ErrorKind) {
        self.lock().script.push_back(ReadStep::Fail(kind));
    }

    /// Makes every subsequent write fail with a broken-pipe error.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Every write so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Every write so far, decoded as lossy UTF-8 and concatenated.
    pub fn written_text(&self) -> String {
        self.lock()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Number of `read` calls served.
    pub fn read_calls(&self) -> u32 {
        self.lock().read_calls
    }

    /// Number of times `close` was invoked.
    pub fn close_calls(&self) -> u32 {
        self.lock().close_calls
    }

    /// Whether `close` has been invoked at least once.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StreamState> {
        self.inner.lock().expect("lock poisoned")
    }
}

impl TransportStream for MockStream {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.fail_writes {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        state.writes.push(bytes.to_vec());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.read_calls += 1;
        match state.script.pop_front() {
            None | Some(ReadStep::Idle) => Ok(0),
            Some(ReadStep::Fail(kind)) => {
                Err(TransportError::Io(std::io::Error::new(kind, "mock read failure")))
            }
            Some(ReadStep::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    // Leftover bytes are delivered by the next read.
                    let rest = data.split_off(n);
                    state.script.push_front(ReadStep::Data(rest));
                }
                Ok(n)
            }
        }
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.close_calls += 1;
        state.closed = true;
    }
}

// ── Relay board mock ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct BoardState {
    product: String,
    serial: [u8; SERIAL_LEN],
    relay_bits: u8,
    num_relays: u8,
    get_calls: u32,
    set_payloads: Vec<Vec<u8>>,
    close_calls: u32,
    closed: bool,
    fail_transfers: bool,
}

/// A simulated USB-HID relay board.
///
/// Interprets the SET_REPORT opcodes the real firmware understands and serves
/// the 8-byte status report from its internal relay mask.
#[derive(Debug, Clone)]
pub struct MockRelayBoard {
    inner: Arc<Mutex<BoardState>>,
}

impl MockRelayBoard {
    /// Creates a board with `num_relays` relays, product `"USBRelay<n>"` and
    /// serial `"MOCK1"`, all relays released.
    pub fn new(num_relays: u8) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BoardState {
                product: format!("USBRelay{num_relays}"),
                serial: *b"MOCK1",
                relay_bits: 0,
                num_relays,
                get_calls: 0,
                set_payloads: Vec::new(),
                close_calls: 0,
                closed: false,
                fail_transfers: false,
            })),
        }
    }

    /// Overrides the product string reported to the driver.
    pub fn with_product(self, product: &str) -> Self {
        self.lock().product = product.to_string();
        self
    }

    /// Overrides the raw serial bytes in the status report.
    pub fn with_serial_bytes(self, serial: [u8; SERIAL_LEN]) -> Self {
        self.lock().serial = serial;
        self
    }

    /// Sets the raw relay mask, as if relays were switched out-of-band.
    pub fn set_raw_state(&self, bits: u8) {
        self.lock().relay_bits = bits;
    }

    /// The raw relay mask as the board currently holds it.
    pub fn raw_state(&self) -> u8 {
        self.lock().relay_bits
    }

    /// Makes every subsequent transfer fail.
    pub fn fail_transfers(&self, fail: bool) {
        self.lock().fail_transfers = fail;
    }

    /// Number of GET_REPORT transfers served.
    pub fn get_calls(&self) -> u32 {
        self.lock().get_calls
    }

    /// Every SET_REPORT payload received, in order.
    pub fn set_payloads(&self) -> Vec<Vec<u8>> {
        self.lock().set_payloads.clone()
    }

    /// Number of times `close` was invoked.
    pub fn close_calls(&self) -> u32 {
        self.lock().close_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardState> {
        self.inner.lock().expect("lock poisoned")
    }
}

impl BoardState {
    fn all_on_mask(&self) -> u8 {
        if self.num_relays >= 8 {
            0xFF
        } else {
            (1u8 << self.num_relays) - 1
        }
    }

    fn check_usable(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.fail_transfers {
            return Err(TransportError::Transfer("mock transfer failure".to_string()));
        }
        Ok(())
    }

    fn apply(&mut self, data: &[u8]) {
        let relay_bit = |n: u8| match n {
            1..=8 => 1u8 << (n - 1),
            _ => 0,
        };
        match data[0] {
            OP_RELAY_ON => self.relay_bits |= relay_bit(data[1]),
            OP_RELAY_OFF => self.relay_bits &= !relay_bit(data[1]),
            OP_ALL_ON => self.relay_bits = self.all_on_mask(),
            OP_ALL_OFF => self.relay_bits = 0,
            OP_SET_SERIAL => self.serial.copy_from_slice(&data[1..1 + SERIAL_LEN]),
            _ => {} // unknown opcodes are ignored by the firmware
        }
    }
}

impl FeatureReportDevice for MockRelayBoard {
    fn product_name(&self) -> Result<String, TransportError> {
        let state = self.lock();
        state.check_usable()?;
        Ok(state.product.clone())
    }

    fn get_feature_report(&mut self, report_id: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.lock();
        state.check_usable()?;
        if report_id != STATUS_REPORT_ID {
            return Err(TransportError::Transfer(format!("unknown report id {report_id}")));
        }
        state.get_calls += 1;

        let mut report = [0u8; REPORT_LEN];
        report[..SERIAL_LEN].copy_from_slice(&state.serial);
        report[REPORT_LEN - 1] = state.relay_bits;

        let n = buf.len().min(REPORT_LEN);
        buf[..n].copy_from_slice(&report[..n]);
        Ok(n)
    }

    fn set_feature_report(&mut self, report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.check_usable()?;
        if report_id != STATUS_REPORT_ID {
            return Err(TransportError::Transfer(format!("unknown report id {report_id}")));
        }
        if data.len() != REPORT_LEN {
            return Err(TransportError::Transfer(format!(
                "SET_REPORT payload must be {REPORT_LEN} bytes, got {}",
                data.len()
            )));
        }
        state.set_payloads.push(data.to_vec());
        state.apply(data);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.close_calls += 1;
        state.closed = true;
    }
}
