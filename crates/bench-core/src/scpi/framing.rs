//! CR LF line framing over a [`TransportStream`].
//!
//! Wire format of one response:
//! ```text
//! [text bytes ...][0x0D][0x0A]
//! ```
//!
//! The framer reads small bounded chunks until the accumulated buffer ends in
//! CR LF.  A silent device is detected by counting consecutive zero-byte
//! reads; once the budget is exhausted the partial buffer is thrown away and
//! the caller receives the empty frame.  Garbage bytes never raise: invalid
//! UTF-8 is rendered as `\xNN` escapes.
//!
//! A frame is either a complete terminator-delimited message or empty, never
//! a partial fragment.  Messages of any length are accepted unless a length
//! cap is configured; a capped message is still read through its terminator
//! so the next frame starts on a message boundary.

use tracing::{debug, warn};

use crate::transport::{TransportError, TransportStream};

/// Message terminator used by every text instrument on the bench.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Bytes requested from the transport per read.
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Consecutive idle reads tolerated before a frame is abandoned.  The frame
/// is dropped on the read that *exceeds* this count.
pub const DEFAULT_MAX_IDLE_READS: u32 = 2;

/// One decoded response message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseFrame {
    /// Message text with the terminator and surrounding whitespace removed.
    pub text: String,
    /// `true` when a terminator was found at the end of the buffer.
    pub terminated: bool,
}

impl ResponseFrame {
    /// The empty frame returned for timeouts and malformed input.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a frame from a raw buffer.
    ///
    /// The buffer is decoded with escapes, then the first CR LF must sit at
    /// exactly `len - 2`.  An embedded or missing terminator yields the empty
    /// frame.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let decoded = decode_escaped(raw);
        match decoded.find("\r\n") {
            Some(pos) if pos + 2 == decoded.len() => Self {
                text: decoded.trim().to_string(),
                terminated: true,
            },
            _ => Self::empty(),
        }
    }

    /// `true` when the frame carries no text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

}

/// Decodes `bytes` as UTF-8, replacing every invalid byte with a `\xNN`
/// escape (lowercase hex) instead of failing.
pub fn decode_escaped(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                // `None` means a truncated sequence at the very end.
                let bad_len = e.error_len().unwrap_or(after.len());
                for b in &after[..bad_len] {
                    out.push_str(&format!("\\x{b:02x}"));
                }
                rest = &after[bad_len..];
            }
        }
    }
}

/// Accumulates chunks from a transport into one [`ResponseFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineFramer {
    chunk_size: usize,
    max_idle_reads: u32,
    max_frame_len: Option<usize>,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_idle_reads: DEFAULT_MAX_IDLE_READS,
            max_frame_len: None,
        }
    }
}

impl LineFramer {
    /// Creates a framer with the default chunk size and idle budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-read chunk size (at least 1 byte).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sets how many consecutive idle reads are tolerated.
    pub fn with_max_idle_reads(mut self, max_idle_reads: u32) -> Self {
        self.max_idle_reads = max_idle_reads;
        self
    }

    /// Caps the length of one message.  A longer message is read up to its
    /// terminator and then discarded.  `None` (the default) means no cap.
    pub fn with_max_frame_len(mut self, max_frame_len: Option<usize>) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_idle_reads(&self) -> u32 {
        self.max_idle_reads
    }

    pub fn max_frame_len(&self) -> Option<usize> {
        self.max_frame_len
    }

    /// Reads one frame from `transport`.
    ///
    /// Idle-read exhaustion and malformed data produce the empty frame; only
    /// a failing `read` is returned as an error.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the transport itself fails.
    pub fn read_frame<T>(&self, transport: &mut T) -> Result<ResponseFrame, TransportError>
    where
        T: TransportStream + ?Sized,
    {
        match self.accumulate(transport)? {
            Some(raw) => {
                let frame = ResponseFrame::from_bytes(&raw);
                if !frame.terminated {
                    warn!(len = raw.len(), "terminator not at end of buffer; frame dropped");
                }
                Ok(frame)
            }
            None => Ok(ResponseFrame::empty()),
        }
    }

    /// Returns the raw buffer once it ends in CR LF, or `None` when the frame
    /// was abandoned.
    fn accumulate<T>(&self, transport: &mut T) -> Result<Option<Vec<u8>>, TransportError>
    where
        T: TransportStream + ?Sized,
    {
        let mut buf = Vec::new();
        let mut chunk = vec![0u8; self.chunk_size];
        let mut idle_reads = 0u32;
        // Bytes dropped from an over-long message that is being drained.
        let mut overflowed = 0usize;

        loop {
            let n = transport.read(&mut chunk)?;
            if n == 0 {
                idle_reads += 1;
                if idle_reads > self.max_idle_reads {
                    if overflowed > 0 {
                        warn!(
                            discarded = overflowed + buf.len(),
                            "over-long frame never terminated; discarded"
                        );
                    } else if buf.is_empty() {
                        debug!(idle_reads, "no response before idle budget ran out");
                    } else {
                        warn!(
                            discarded = buf.len(),
                            "no terminator before idle budget ran out; partial frame discarded"
                        );
                    }
                    return Ok(None);
                }
                continue;
            }

            idle_reads = 0;
            buf.extend_from_slice(&chunk[..n]);
            if buf.ends_with(TERMINATOR) {
                let len = overflowed + buf.len() - TERMINATOR.len();
                if self.max_frame_len.is_some_and(|limit| len > limit) {
                    warn!(
                        len,
                        "frame exceeded length limit; discarded"
                    );
                    return Ok(None);
                }
                return Ok(Some(buf));
            }
            if let Some(limit) = self.max_frame_len {
                if buf.len() > limit || overflowed > 0 {
                    // Keep the last byte: it may be the CR of a split CR LF.
                    let drop = buf.len() - 1;
                    buf.drain(..drop);
                    overflowed += drop;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockStream;
    use crate::transport::MockTransportStream;

    #[test]
    fn test_read_frame_single_chunk() {
        // Arrange
        let mut stream = MockStream::with_chunks([b"12.34\r\n"]);

        // Act
        let frame = LineFramer::new().read_frame(&mut stream).expect("read");

        // Assert
        assert_eq!(frame.text, "12.34");
        assert!(frame.terminated);
    }

    #[test]
    fn test_read_frame_reassembles_arbitrary_splits() {
        // Arrange: split right between CR and LF as well
        let mut stream = MockStream::with_chunks([&b"SIGL"[..], &b"ENT,SPD"[..], &b"3303X\r"[..], &b"\n"[..]]);

        // Act
        let frame = LineFramer::new().read_frame(&mut stream).expect("read");

        // Assert
        assert_eq!(frame.text, "SIGLENT,SPD3303X");
    }

    #[test]
    fn test_read_frame_every_split_point_gives_same_text() {
        let message = b"+1.2345E+00\r\n";
        for split in 1..message.len() {
            let (head, tail) = message.split_at(split);
            let mut stream = MockStream::with_chunks([head, tail]);
            let frame = LineFramer::new().read_frame(&mut stream).expect("read");
            assert_eq!(frame.text, "+1.2345E+00", "split at {split}");
        }
    }

    #[test]
    fn test_read_frame_tolerates_idle_reads_within_budget() {
        // Arrange: two idle reads between fragments is still within budget
        let stream = MockStream::new();
        stream.push_data(b"4.5");
        stream.push_idle();
        stream.push_idle();
        stream.push_data(b"6\r\n");
        let mut stream = stream;

        // Act
        let frame = LineFramer::new().read_frame(&mut stream).expect("read");

        // Assert
        assert_eq!(frame.text, "4.56");
    }

    #[test]
    fn test_read_frame_idle_counter_resets_after_data() {
        let stream = MockStream::new();
        stream.push_idle();
        stream.push_idle();
        stream.push_data(b"a");
        stream.push_idle();
        stream.push_idle();
        stream.push_data(b"b\r\n");
        let mut stream = stream;

        let frame = LineFramer::new().read_frame(&mut stream).expect("read");

        assert_eq!(frame.text, "ab");
    }

    #[test]
    fn test_read_frame_three_idle_reads_returns_empty() {
        // Arrange: partial data, then silence
        let stream = MockStream::with_chunks([b"partial"]);
        let mut reader = stream.clone();

        // Act
        let frame = LineFramer::new().read_frame(&mut reader).expect("read");

        // Assert: 1 data read + 3 idle reads, buffer discarded
        assert!(frame.is_empty());
        assert!(!frame.terminated);
        assert_eq!(stream.read_calls(), 4);
    }

    #[test]
    fn test_read_frame_silent_device_returns_empty() {
        let mut stream = MockStream::new();
        let frame = LineFramer::new().read_frame(&mut stream).expect("read");
        assert_eq!(frame, ResponseFrame::empty());
    }

    #[test]
    fn test_read_frame_escapes_invalid_byte() {
        // Arrange
        let mut stream = MockStream::with_chunks([&[0xFFu8, b'\r', b'\n'][..]]);

        // Act
        let frame = LineFramer::new().read_frame(&mut stream).expect("must not raise");

        // Assert
        assert_eq!(frame.text, "\\xff");
        assert!(frame.terminated);
    }

    #[test]
    fn test_read_frame_embedded_terminator_returns_empty() {
        let mut stream = MockStream::with_chunks([b"ab\r\ncd\r\n"]);
        let frame = LineFramer::new().read_frame(&mut stream).expect("read");
        assert!(frame.is_empty());
    }

    #[test]
    fn test_read_frame_accepts_long_message_then_next_reply() {
        // Arrange: 5000 text bytes in 64-byte chunks, then a second reply
        let mut long = vec![b'7'; 5000];
        long.extend_from_slice(b"\r\n");
        let stream = MockStream::new();
        stream.push_data(&long);
        stream.push_response("0  No error");
        let mut stream = stream;
        let framer = LineFramer::new();

        // Act
        let first = framer.read_frame(&mut stream).expect("read");
        let second = framer.read_frame(&mut stream).expect("read");

        // Assert
        assert!(first.terminated);
        assert_eq!(first.text.len(), 5000);
        assert_eq!(second.text, "0  No error");
    }

    #[test]
    fn test_read_frame_capped_message_is_drained_to_its_terminator() {
        // Arrange
        let mut long = vec![b'x'; 640];
        long.extend_from_slice(b"\r\n");
        let stream = MockStream::new();
        stream.push_data(&long);
        stream.push_response("0  No error");
        let mut stream = stream;
        let framer = LineFramer::new().with_max_frame_len(Some(256));

        // Act
        let first = framer.read_frame(&mut stream).expect("read");
        let second = framer.read_frame(&mut stream).expect("read");

        // Assert
        assert!(first.is_empty());
        assert_eq!(second.text, "0  No error");
    }

    #[test]
    fn test_read_frame_capped_message_split_inside_terminator() {
        let stream = MockStream::new();
        stream.push_data(&[b'x'; 300]);
        stream.push_data(b"\r");
        stream.push_data(b"\n");
        stream.push_response("next");
        let mut stream = stream;
        let framer = LineFramer::new().with_max_frame_len(Some(100));

        assert!(framer.read_frame(&mut stream).expect("read").is_empty());
        assert_eq!(framer.read_frame(&mut stream).expect("read").text, "next");
    }

    #[test]
    fn test_read_frame_capped_message_without_terminator_times_out() {
        let stream = MockStream::new();
        for _ in 0..10 {
            stream.push_data(&[b'x'; 64]);
        }
        let mut stream = stream;
        let framer = LineFramer::new().with_max_frame_len(Some(256));

        let frame = framer.read_frame(&mut stream).expect("read");

        assert!(frame.is_empty());
    }

    #[test]
    fn test_read_frame_requests_bounded_chunks() {
        // Arrange
        let mut transport = MockTransportStream::new();
        transport
            .expect_read()
            .withf(|buf| buf.len() == DEFAULT_CHUNK_SIZE)
            .times(1)
            .returning(|buf| {
                buf[..3].copy_from_slice(b"1\r\n");
                Ok(3)
            });

        // Act
        let frame = LineFramer::new().read_frame(&mut transport).expect("read");

        // Assert
        assert_eq!(frame.text, "1");
    }

    #[test]
    fn test_read_frame_propagates_transport_failure() {
        let stream = MockStream::new();
        stream.push_failure(std::io::ErrorKind::BrokenPipe);
        let mut stream = stream;

        let result = LineFramer::new().read_frame(&mut stream);

        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[test]
    fn test_decode_escaped_keeps_valid_multibyte_text() {
        assert_eq!(decode_escaped("5K\u{03A9}".as_bytes()), "5K\u{03A9}");
    }

    #[test]
    fn test_decode_escaped_truncated_sequence_at_end() {
        // First two bytes of a three-byte sequence
        assert_eq!(decode_escaped(&[b'a', 0xE2, 0x82]), "a\\xe2\\x82");
    }
}
