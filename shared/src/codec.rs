//! Newline-delimited codec for the client line protocol
//!
//! Requests are UTF-8 lines, each terminated by `\n` (a preceding `\r` is
//! tolerated). Replies are a single decimal value followed by `\n`:
//! ```text
//! -> latitude\n
//! <- 47.3977419\n
//! -> arm\r\n
//! ```
//!
//! Bytes are accumulated until a terminator arrives, so a line may span
//! several socket reads and one read may carry several lines.

use bytes::{Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

use crate::limits::MAX_LINE_BYTES;

/// Errors that can occur while framing client input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("Line too long: more than {max} bytes before the terminator")]
    LineTooLong { max: usize },

    #[error("Line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// How socket reads are turned into command lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Buffer until `\n`, bounded by the line limit
    #[default]
    Lines,
    /// Every read is one whole command (legacy behaviour)
    PerRead,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Lines => write!(f, "lines"),
            Framing::PerRead => write!(f, "per-read"),
        }
    }
}

/// Render a telemetry reading as a response line
pub fn encode_reading<T: fmt::Display>(value: T) -> Bytes {
    Bytes::from(format!("{}\n", value))
}

/// Try to split one complete line off the front of `buf`
///
/// Returns:
/// - `Ok(Some(line))` with the terminator still attached
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the pending line is over the limit or not UTF-8
pub fn decode_line(buf: &mut BytesMut, max_line_bytes: usize) -> Result<Option<String>, LineError> {
    match buf.iter().position(|b| *b == b'\n') {
        Some(pos) => {
            let line = buf.split_to(pos + 1);
            if content_len(&line) > max_line_bytes {
                return Err(LineError::LineTooLong {
                    max: max_line_bytes,
                });
            }
            let text = std::str::from_utf8(&line)?;
            Ok(Some(text.to_owned()))
        }
        // One extra byte may be the `\r` of a pending `\r\n`
        None if buf.len() > max_line_bytes + 1 => Err(LineError::LineTooLong {
            max: max_line_bytes,
        }),
        None => Ok(None),
    }
}

/// Decode a whole read as one command, the way the legacy framing does
pub fn decode_chunk(chunk: &[u8]) -> Result<String, LineError> {
    Ok(std::str::from_utf8(chunk)?.to_owned())
}

/// Length of a terminated line without its `\n` / `\r\n`
fn content_len(line: &[u8]) -> usize {
    let len = line.len().saturating_sub(1);
    if len > 0 && line[len - 1] == b'\r' {
        len - 1
    } else {
        len
    }
}

/// Streaming line decoder
#[derive(Debug)]
pub struct LineDecoder {
    /// Bytes of the line(s) being accumulated
    buffer: BytesMut,
    max_line_bytes: usize,
}

impl LineDecoder {
    /// Create a decoder with the default line limit
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }

    /// Create a decoder with a custom line limit
    pub fn with_max_line(max_line_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_line_bytes + 2),
            max_line_bytes,
        }
    }

    /// Add received bytes to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next line from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain every complete line
    pub fn decode_next(&mut self) -> Result<Option<String>, LineError> {
        decode_line(&mut self.buffer, self.max_line_bytes)
    }

    /// Bytes of an unterminated line still held
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"latitude\n");

        let line = decoder.decode_next().expect("decode error");
        assert_eq!(line.as_deref(), Some("latitude\n"));
        assert!(decoder.decode_next().expect("decode error").is_none());
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_line_split_across_reads() {
        let mut decoder = LineDecoder::new();

        decoder.extend(b"lati");
        assert!(decoder.decode_next().expect("decode error").is_none());
        assert_eq!(decoder.buffer_len(), 4);

        decoder.extend(b"tude\r\n");
        let line = decoder.decode_next().expect("decode error");
        assert_eq!(line.as_deref(), Some("latitude\r\n"));
    }

    #[test]
    fn test_multiple_lines_in_one_read() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"arm\nbattery\r\nkill");

        assert_eq!(decoder.decode_next().unwrap().as_deref(), Some("arm\n"));
        assert_eq!(decoder.decode_next().unwrap().as_deref(), Some("battery\r\n"));
        assert!(decoder.decode_next().unwrap().is_none());

        // Partial "kill" stays buffered
        assert_eq!(decoder.buffer_len(), 4);
    }

    #[test]
    fn test_empty_line() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"\n");
        assert_eq!(decoder.decode_next().unwrap().as_deref(), Some("\n"));
    }

    #[test]
    fn test_line_at_limit() {
        let mut decoder = LineDecoder::with_max_line(8);
        decoder.extend(b"12345678\r\n");
        assert_eq!(decoder.decode_next().unwrap().as_deref(), Some("12345678\r\n"));
    }

    #[test]
    fn test_terminated_line_too_long() {
        let mut decoder = LineDecoder::with_max_line(8);
        decoder.extend(b"123456789\n");

        let result = decoder.decode_next();
        assert_eq!(result, Err(LineError::LineTooLong { max: 8 }));
    }

    #[test]
    fn test_unterminated_line_too_long() {
        let mut decoder = LineDecoder::with_max_line(8);

        // Limit plus a possible '\r' is still acceptable while waiting
        decoder.extend(b"12345678\r");
        assert!(decoder.decode_next().unwrap().is_none());

        decoder.extend(b"x");
        assert!(matches!(
            decoder.decode_next(),
            Err(LineError::LineTooLong { .. })
        ));
    }

    #[test]
    fn test_default_limit() {
        let mut decoder = LineDecoder::default();
        decoder.extend(&[b'a'; MAX_LINE_BYTES + 1]);
        assert!(decoder.decode_next().unwrap().is_none());

        decoder.extend(b"a");
        assert!(decoder.decode_next().is_err());
    }

    #[test]
    fn test_invalid_utf8() {
        let mut decoder = LineDecoder::new();
        decoder.extend(&[0xff, 0xfe, b'\n']);
        assert!(matches!(
            decoder.decode_next(),
            Err(LineError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_decode_chunk() {
        assert_eq!(decode_chunk(b"arm\r\n").unwrap(), "arm\r\n");
        // No terminator needed: the read itself is the frame
        assert_eq!(decode_chunk(b"battery").unwrap(), "battery");
        assert!(decode_chunk(&[0xc3, 0x28]).is_err());
    }

    #[test]
    fn test_encode_reading() {
        assert_eq!(&encode_reading(47.3977419_f64)[..], b"47.3977419\n");
        assert_eq!(&encode_reading(12.5_f32)[..], b"12.5\n");
        assert_eq!(&encode_reading(0.0_f64)[..], b"0\n");
    }
}
