//! Infrastructure layer for rf-telemetry-bridge.
//!
//! The infrastructure layer handles all I/O: the serial device and its owner
//! thread, the WebSocket listener and sessions, and the config file.
//!
//! # What does NOT belong here?
//!
//! - Fan-out and command dispatch rules (that is the application layer)
//! - Configuration and notice types (that is the domain layer)
//! - CLI parsing and logging setup (that is done in `main.rs`)

pub mod config_file;
pub mod serial;
pub mod ws_server;

pub use config_file::{load_config_file, ConfigError, FileConfig};
pub use serial::{open_link, SerialError, SerialLink};
pub use ws_server::BridgeServer;
