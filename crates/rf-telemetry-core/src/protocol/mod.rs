//! Protocol layer: the two text formats the bridge speaks.
//!
//! ```text
//! Device → Bridge:  raw bytes  →  LineFramer  →  TelemetryLine (validated JSON text)
//! Client → Bridge:  JSON text  →  CommandBatch  →  encode_command()  →  serial bytes
//! ```

pub mod commands;
pub mod framing;
