//! rf-telemetry-bridge library crate.
//!
//! This crate relays newline-delimited JSON telemetry from a serial-attached
//! RF device to any number of WebSocket clients, and writes the command
//! batches those clients send back to the device.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! WebSocket clients (JSON text frames)
//!         ↕
//! [rf-telemetry-bridge]
//!   ├── domain/           Pure types: BridgeConfig, BridgeNotice
//!   ├── application/      Fan-out registry, command dispatch
//!   └── infrastructure/
//!         ├── serial/     Serial link + owner thread (serialport)
//!         ├── ws_server/  WebSocket accept loop and sessions (tokio-tungstenite)
//!         └── config_file/ TOML config loading
//!         ↕
//! Serial device (rf-telemetry-core line framing)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `rf-telemetry-core`; it uses tokio
//!   channels but never touches sockets or devices.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tungstenite` and `serialport`.

/// Domain layer: configuration and client-facing notice types (no I/O).
pub mod domain;

/// Application layer: client registry and command dispatch.
pub mod application;

/// Infrastructure layer: serial device, WebSocket server, config file.
pub mod infrastructure;
