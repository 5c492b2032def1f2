//! Application layer for rf-telemetry-bridge.
//!
//! Knows *what* happens to telemetry and commands, not *how* bytes move:
//!
//! - [`registry`] fans each telemetry line out to a bounded queue per
//!   connected client, dropping the newest line for any client whose queue is
//!   full.
//! - [`dispatch`] writes a client's command batch through a [`CommandSink`],
//!   in order, stopping at the first failure.
//!
//! Sockets, serial ports and task spawning live in the infrastructure layer.

pub mod dispatch;
pub mod registry;

pub use dispatch::{dispatch_batch, CommandSink, DispatchOutcome};
pub use registry::{fan_out, ClientId, ClientRegistry, PublishReport};
