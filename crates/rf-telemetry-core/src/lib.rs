//! # rf-telemetry-core
//!
//! Shared protocol types for the RF telemetry bridge.
//!
//! This crate knows how bytes from an attached radio device become telemetry
//! lines, and how client command batches become bytes for that device.  It has
//! zero dependencies on serial ports, sockets, or async runtimes, so every
//! rule here can be tested with plain byte slices.
//!
//! # Overview
//!
//! - **`protocol::framing`** – Splits a serial byte stream on `\n`, validates
//!   each line as a JSON object or array, and hands back [`TelemetryLine`]s.
//!   Malformed lines are reported as [`LineError`]s so the caller can count
//!   and drop them.
//!
//! - **`protocol::commands`** – Parses the `{"cmds": [...]}` envelope that
//!   WebSocket clients send, keeps only non-empty string entries, and encodes
//!   each one as a newline-terminated serial line.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `rf_telemetry_core::LineFramer` instead of the full module path.
pub use protocol::commands::{encode_command, CommandBatch, CommandError, COMMANDS_FIELD};
pub use protocol::framing::{
    LineError, LineFramer, TelemetryLine, DEFAULT_MAX_LINE_LEN, LINE_TERMINATOR,
};
