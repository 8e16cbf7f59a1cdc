//! Text line decoding for the continuous sample stream.
//!
//! The instrument prints one or more decimal integers per line, possibly mixed with
//! labels (`"ch0: -1234"`). Every `-?\d+` token on a line becomes one sample,
//! left to right. Lines with no tokens are dropped.

use bytes::{Buf, BytesMut};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Raw ADC code as produced by the instrument.
pub type Sample = i16;

/// Lines longer than this without a newline are treated as garbage and discarded.
pub const MAX_LINE_BYTES: usize = 4096;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+").expect("Invalid sample token regex"));

/// Why a line produced no samples. Never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Line was empty after trimming.
    #[error("blank line")]
    Blank,

    /// Line had text but no integer tokens.
    #[error("no numeric tokens in line {0:?}")]
    NoNumericTokens(String),

    /// More than [`MAX_LINE_BYTES`] arrived without a line terminator.
    #[error("line exceeded {MAX_LINE_BYTES} bytes without terminator")]
    Overflow,
}

/// Decode every integer token in a single line.
///
/// Tokens outside the 16-bit range saturate to `i16::MIN` / `i16::MAX`.
pub fn decode_line(line: &str) -> Result<Vec<Sample>, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DecodeError::Blank);
    }

    let samples: Vec<Sample> = NUMBER_RE
        .find_iter(line)
        .map(|token| saturate(token.as_str()))
        .collect();

    if samples.is_empty() {
        Err(DecodeError::NoNumericTokens(line.to_string()))
    } else {
        Ok(samples)
    }
}

fn saturate(token: &str) -> Sample {
    match token.parse::<i64>() {
        Ok(value) => value.clamp(i64::from(Sample::MIN), i64::from(Sample::MAX)) as Sample,
        // Only digit overflow can fail here; the sign decides the rail.
        Err(_) if token.starts_with('-') => Sample::MIN,
        Err(_) => Sample::MAX,
    }
}

/// Incremental splitter turning arbitrary byte chunks into decoded lines.
///
/// Bytes are accumulated until a `\n` arrives; a trailing `\r` is ignored.
/// Invalid UTF-8 is replaced rather than rejected, matching the tolerant
/// behaviour expected from cheap USB-serial firmware.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: BytesMut,
}

impl LineDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self {
            pending: BytesMut::with_capacity(256),
        }
    }

    /// Append raw bytes read from the port.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Pop the next complete line, decoded.
    ///
    /// Returns `None` when no complete line is buffered. An over-long partial
    /// line is discarded and reported once as [`DecodeError::Overflow`].
    pub fn next_line(&mut self) -> Option<Result<Vec<Sample>, DecodeError>> {
        match self.pending.iter().position(|&b| b == b'\n') {
            Some(end) => {
                let line = self.pending.split_to(end + 1);
                let text = String::from_utf8_lossy(&line[..end]);
                Some(decode_line(&text))
            }
            None if self.pending.len() > MAX_LINE_BYTES => {
                self.pending.advance(self.pending.len());
                Some(Err(DecodeError::Overflow))
            }
            None => None,
        }
    }

    /// Number of bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop any partial line.
    ///
    /// Called after a command exchange so that stream bytes from before and
    /// after the exchange are never glued into one line.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
