//! Domain layer for rf-telemetry-bridge.
//!
//! Plain data types with no dependencies on I/O, networking, or async
//! runtimes: the runtime configuration and the few messages the bridge itself
//! (as opposed to the device) sends to clients.

pub mod config;
pub mod messages;

pub use config::{BridgeConfig, QueueSettings, SerialSettings};
pub use messages::BridgeNotice;
