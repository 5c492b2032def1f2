//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! `main.rs` builds it from CLI flags, environment variables and an optional
//! TOML file; tests build it directly with [`BridgeConfig::for_port`].
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! reads in the domain) lets the server be embedded in tests with an
//! ephemeral port and an in-memory serial link.

use std::net::SocketAddr;
use std::time::Duration;

use rf_telemetry_core::DEFAULT_MAX_LINE_LEN;
use thiserror::Error;

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// Default WebSocket listener port.
pub const DEFAULT_WS_PORT: u16 = 8765;
/// Default WebSocket endpoint path.
pub const DEFAULT_ENDPOINT_PATH: &str = "/telemetry";
/// Default serial read timeout; bounds how long a queued write or a shutdown
/// request waits for the serial owner thread.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Default capacity of the serial → dispatcher queue.
pub const DEFAULT_INGEST_CAPACITY: usize = 1024;
/// Default capacity of each client's telemetry queue.
pub const DEFAULT_CLIENT_CAPACITY: usize = 256;

/// A configuration value that cannot be used to start the bridge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("no serial port given (use --port or [serial] port in the config file)")]
    MissingSerialPort,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("endpoint path '{0}' must start with '/'")]
    BadEndpointPath(String),
}

/// How the serial device is opened and read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Device path (`/dev/ttyUSB0`, `COM5`) or `loop://` for the echo link.
    pub port: String,
    pub baud_rate: u32,
    /// Upper bound on a single blocking read.
    pub read_timeout: Duration,
    /// Lines longer than this many bytes are discarded.
    pub max_line_len: usize,
}

/// Capacities of the two telemetry queues.
///
/// When a queue is full the newest line is dropped for that queue only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Serial owner thread → dispatcher.
    pub ingest_capacity: usize,
    /// Dispatcher → one client's forwarding task.
    pub client_capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            ingest_capacity: DEFAULT_INGEST_CAPACITY,
            client_capacity: DEFAULT_CLIENT_CAPACITY,
        }
    }
}

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use rf_telemetry_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::for_port("/dev/ttyUSB0");
/// assert_eq!(cfg.ws_bind_addr.port(), 8765);
/// assert_eq!(cfg.endpoint_path, "/telemetry");
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub serial: SerialSettings,

    /// Address the WebSocket listener binds to.
    ///
    /// Defaults to loopback; bind `0.0.0.0` explicitly to expose the bridge
    /// on the network (there is no authentication).
    pub ws_bind_addr: SocketAddr,

    /// The only path accepted for the WebSocket upgrade.
    pub endpoint_path: String,

    pub queues: QueueSettings,
}

impl BridgeConfig {
    /// Returns the default configuration for the serial device at `port`.
    ///
    /// | Field              | Default           |
    /// |--------------------|-------------------|
    /// | baud_rate          | 115200            |
    /// | read_timeout       | 100 ms            |
    /// | max_line_len       | 65536             |
    /// | ws_bind_addr       | `127.0.0.1:8765`  |
    /// | endpoint_path      | `/telemetry`      |
    /// | ingest_capacity    | 1024              |
    /// | client_capacity    | 256               |
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            serial: SerialSettings {
                port: port.into(),
                baud_rate: DEFAULT_BAUD_RATE,
                read_timeout: DEFAULT_READ_TIMEOUT,
                max_line_len: DEFAULT_MAX_LINE_LEN,
            },
            ws_bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_WS_PORT)),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            queues: QueueSettings::default(),
        }
    }

    /// Checks the values that would otherwise fail later at runtime.
    ///
    /// Zero-capacity channels cannot be created, and a zero read timeout
    /// would turn the serial owner into a busy loop.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidConfig`] found.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.serial.port.trim().is_empty() {
            return Err(InvalidConfig::MissingSerialPort);
        }
        if self.serial.baud_rate == 0 {
            return Err(InvalidConfig::Zero("baud rate"));
        }
        if self.serial.read_timeout.is_zero() {
            return Err(InvalidConfig::Zero("serial read timeout"));
        }
        if self.serial.max_line_len == 0 {
            return Err(InvalidConfig::Zero("max line length"));
        }
        if self.queues.ingest_capacity == 0 {
            return Err(InvalidConfig::Zero("ingest queue capacity"));
        }
        if self.queues.client_capacity == 0 {
            return Err(InvalidConfig::Zero("client queue capacity"));
        }
        if !self.endpoint_path.starts_with('/') {
            return Err(InvalidConfig::BadEndpointPath(self.endpoint_path.clone()));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
