//! Line framing and validation for the serial telemetry stream.
//!
//! Wire format (device → bridge):
//! ```text
//! {"mbps": 12.3, "freq": 915000000}\n
//! [1, 2, 3]\r\n
//! ```
//! One JSON object or array per line, terminated by `\n`.  A single trailing
//! `\r` before the terminator is tolerated and stripped.  Anything else on a
//! line (boot banners, half-written records, scalar values) is rejected.
//!
//! Serial reads do not respect line boundaries: one read may carry half a
//! line, or three lines at once.  [`LineFramer`] keeps the unfinished tail of
//! the previous read and only emits an outcome once a terminator arrives.

use std::fmt;
use std::sync::Arc;

use serde::de::IgnoredAny;
use thiserror::Error;

/// Byte that ends every telemetry line.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default upper bound on a single line, excluding the terminator.
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// Reasons a completed line was not accepted as telemetry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LineError {
    /// The line held nothing but whitespace.
    #[error("empty line")]
    Empty,

    /// The line is not syntactically valid JSON.
    #[error("line is not valid JSON: {0}")]
    NotJson(String),

    /// The line is valid JSON but a scalar (number, string, bool, null).
    #[error("line is JSON but neither an object nor an array")]
    NotStructured,

    /// The line grew past the framer's limit before its terminator arrived.
    #[error("line exceeds the {max}-byte limit")]
    TooLong { max: usize },
}

// ── TelemetryLine ─────────────────────────────────────────────────────────────

/// One validated line of device telemetry.
///
/// Holds the original text, never a re-encoded value, so clients receive
/// exactly what the device produced.  The one exception is the terminator:
/// the `\n` and a single `\r` before it are removed, so a CRLF device and an
/// LF device yield the same text.  The text is behind an
/// `Arc` because every connected client gets the same line: cloning a
/// `TelemetryLine` is a reference-count bump, not a copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TelemetryLine(Arc<str>);

impl TelemetryLine {
    /// Validates `text` as a JSON object or array and wraps it.
    ///
    /// # Errors
    ///
    /// - [`LineError::Empty`] if `text` is blank.
    /// - [`LineError::NotJson`] if `text` does not parse as JSON.
    /// - [`LineError::NotStructured`] if `text` is a JSON scalar.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rf_telemetry_core::{LineError, TelemetryLine};
    ///
    /// let line = TelemetryLine::parse(r#"{"rssi": -71}"#).unwrap();
    /// assert_eq!(line.as_str(), r#"{"rssi": -71}"#);
    ///
    /// assert_eq!(TelemetryLine::parse("42"), Err(LineError::NotStructured));
    /// ```
    pub fn parse(text: &str) -> Result<Self, LineError> {
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            return Err(LineError::Empty);
        }

        // `IgnoredAny` walks the whole document without building a value.
        serde_json::from_str::<IgnoredAny>(text)
            .map_err(|e| LineError::NotJson(e.to_string()))?;

        match trimmed.as_bytes()[0] {
            b'{' | b'[' => Ok(Self(Arc::from(text))),
            _ => Err(LineError::NotStructured),
        }
    }

    /// Returns the line text as received from the device.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the line text in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false` for a parsed line; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for TelemetryLine {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TelemetryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TelemetryLine> for String {
    fn from(line: TelemetryLine) -> Self {
        line.0.to_string()
    }
}

// ── LineFramer ────────────────────────────────────────────────────────────────

/// Reassembles `\n`-terminated lines from arbitrarily chunked serial reads.
///
/// # Example
///
/// ```rust
/// use rf_telemetry_core::LineFramer;
///
/// let mut framer = LineFramer::new();
/// assert!(framer.feed(b"{\"snr\":").is_empty());
///
/// let out = framer.feed(b" 9.5}\nnoise\n");
/// assert_eq!(out.len(), 2);
/// assert_eq!(out[0].as_ref().unwrap().as_str(), "{\"snr\": 9.5}");
/// assert!(out[1].is_err());
/// ```
#[derive(Debug)]
pub struct LineFramer {
    /// Bytes of the current, not yet terminated line.
    buf: Vec<u8>,
    max_line_len: usize,
    /// Set once the current line passed `max_line_len`; its bytes are
    /// discarded until the next terminator.
    overflowed: bool,
}

impl LineFramer {
    /// Creates a framer with [`DEFAULT_MAX_LINE_LEN`].
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Creates a framer that rejects lines longer than `max_line_len` bytes.
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_line_len.min(4096)),
            max_line_len,
            overflowed: false,
        }
    }

    /// The configured per-line byte limit.
    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    /// Number of bytes held for the line currently being assembled.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Appends `bytes` and returns one outcome per line completed by them,
    /// in stream order.
    ///
    /// Bytes after the last terminator stay buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<TelemetryLine, LineError>> {
        let mut out = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|&b| b == LINE_TERMINATOR) {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.overflowed || self.buf.len() + head.len() > self.max_line_len {
                self.overflowed = false;
                self.buf.clear();
                out.push(Err(LineError::TooLong {
                    max: self.max_line_len,
                }));
                continue;
            }

            self.buf.extend_from_slice(head);
            out.push(finish_line(&self.buf));
            self.buf.clear();
        }

        if !self.overflowed {
            if self.buf.len() + rest.len() > self.max_line_len {
                self.overflowed = true;
                self.buf.clear();
            } else {
                self.buf.extend_from_slice(rest);
            }
        }

        out
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns the raw bytes of one line into a validated [`TelemetryLine`].
fn finish_line(raw: &[u8]) -> Result<TelemetryLine, LineError> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    // Invalid UTF-8 is replaced rather than rejected; the JSON check decides.
    let text = String::from_utf8_lossy(raw);
    TelemetryLine::parse(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
