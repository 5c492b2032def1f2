//! RF telemetry bridge: entry point.
//!
//! Reads newline-delimited JSON telemetry from a serial-attached radio and
//! streams every line to all connected WebSocket clients.  Clients may send
//! `{"cmds": [...]}` to have command lines written back to the device.
//!
//! # Usage
//!
//! ```text
//! rf-telemetry-bridge --port <PATH> [OPTIONS]
//!
//! Options:
//!   --port <PATH>            Serial device, or loop:// for an echo link
//!   --baud <N>               Baud rate [default: 115200]
//!   --host <IP>              WebSocket bind address [default: 127.0.0.1]
//!   --ws-port <N>            WebSocket port [default: 8765]
//!   --path <PATH>            WebSocket endpoint path [default: /telemetry]
//!   --ingest-capacity <N>    Serial → dispatcher queue size [default: 1024]
//!   --client-capacity <N>    Per-client queue size [default: 256]
//!   --read-timeout-ms <N>    Serial read timeout [default: 100]
//!   --max-line-len <N>       Longest accepted line in bytes [default: 65536]
//!   --config <FILE>          Optional TOML config file
//!   --log-level <LEVEL>      Log level when RUST_LOG is unset [default: info]
//! ```
//!
//! # Configuration precedence
//!
//! CLI flag, then `RF_BRIDGE_*` environment variable, then the config file,
//! then the built-in default.  `RUST_LOG` overrides every log level setting.
//!
//! # Exit status
//!
//! Non-zero if the configuration is invalid, the serial device cannot be
//! opened (no listener is bound in that case), the listener cannot be bound,
//! or the device fails while running.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rf_telemetry_bridge::domain::BridgeConfig;
use rf_telemetry_bridge::infrastructure::{load_config_file, open_link, BridgeServer, FileConfig};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_LOG_LEVEL: &str = "info";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial RF telemetry to WebSocket bridge.
///
/// Every flag is optional on the command line so that the environment and the
/// config file can fill the gaps; see [`Cli::into_bridge_config`].
#[derive(Debug, Parser)]
#[command(
    name = "rf-telemetry-bridge",
    about = "Stream serial RF telemetry to WebSocket clients",
    version
)]
struct Cli {
    /// Serial device path (e.g. /dev/ttyUSB0, COM5) or loop:// for an
    /// in-process echo link.
    #[arg(long, env = "RF_BRIDGE_SERIAL_PORT")]
    port: Option<String>,

    /// Serial baud rate [default: 115200].
    #[arg(long, env = "RF_BRIDGE_BAUD")]
    baud: Option<u32>,

    /// IP address for the WebSocket listener [default: 127.0.0.1].
    ///
    /// Use `0.0.0.0` to accept connections from other machines.  There is no
    /// authentication.
    #[arg(long, env = "RF_BRIDGE_HOST")]
    host: Option<String>,

    /// WebSocket listener port [default: 8765].
    #[arg(long, alias = "wsport", env = "RF_BRIDGE_WS_PORT")]
    ws_port: Option<u16>,

    /// WebSocket endpoint path [default: /telemetry].
    #[arg(long, env = "RF_BRIDGE_PATH")]
    path: Option<String>,

    /// Capacity of the serial → dispatcher queue [default: 1024].
    #[arg(long, env = "RF_BRIDGE_INGEST_CAPACITY")]
    ingest_capacity: Option<usize>,

    /// Capacity of each client's telemetry queue [default: 256].
    #[arg(long, env = "RF_BRIDGE_CLIENT_CAPACITY")]
    client_capacity: Option<usize>,

    /// Serial read timeout in milliseconds [default: 100].
    #[arg(long, env = "RF_BRIDGE_READ_TIMEOUT_MS")]
    read_timeout_ms: Option<u64>,

    /// Longest accepted telemetry line in bytes [default: 65536].
    #[arg(long, env = "RF_BRIDGE_MAX_LINE_LEN")]
    max_line_len: Option<usize>,

    /// Optional TOML config file.
    #[arg(long, env = "RF_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive used when RUST_LOG is unset [default: info].
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file named by `--config`, if any.
    fn load_file_config(&self) -> anyhow::Result<FileConfig> {
        match &self.config {
            Some(path) => load_config_file(path)
                .with_context(|| format!("failed to load config file {}", path.display())),
            None => Ok(FileConfig::default()),
        }
    }

    /// The log filter to use when `RUST_LOG` is not set.
    fn log_level(&self, file: &FileConfig) -> String {
        self.log_level
            .clone()
            .or_else(|| file.logging.level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    /// Merges CLI/env values over `file` and the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not an IP literal or the merged
    /// configuration fails validation.
    fn into_bridge_config(self, file: FileConfig) -> anyhow::Result<BridgeConfig> {
        let port = self.port.or(file.serial.port).unwrap_or_default();
        let mut config = BridgeConfig::for_port(port);

        let host = self
            .host
            .or(file.server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let ip: IpAddr = host
            .parse()
            .with_context(|| format!("invalid WebSocket host '{host}' (expected an IP address)"))?;
        let ws_port = self
            .ws_port
            .or(file.server.port)
            .unwrap_or(config.ws_bind_addr.port());
        config.ws_bind_addr = SocketAddr::new(ip, ws_port);

        if let Some(path) = self.path.or(file.server.path) {
            config.endpoint_path = path;
        }
        if let Some(baud) = self.baud.or(file.serial.baud_rate) {
            config.serial.baud_rate = baud;
        }
        if let Some(ms) = self.read_timeout_ms.or(file.serial.read_timeout_ms) {
            config.serial.read_timeout = Duration::from_millis(ms);
        }
        if let Some(len) = self.max_line_len.or(file.serial.max_line_len) {
            config.serial.max_line_len = len;
        }
        if let Some(cap) = self.ingest_capacity.or(file.queues.ingest_capacity) {
            config.queues.ingest_capacity = cap;
        }
        if let Some(cap) = self.client_capacity.or(file.queues.client_capacity) {
            config.queues.client_capacity = cap;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Parse CLI/env, load the optional config file, initialise logging.
/// 2. Open the serial device.  Failure here exits before any listener exists.
/// 3. Bind the WebSocket listener.
/// 4. Install the Ctrl+C handler and serve until shutdown or device failure.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = cli.load_file_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level(&file))),
        )
        .init();

    let config = cli.into_bridge_config(file)?;

    info!(
        port = %config.serial.port,
        baud = config.serial.baud_rate,
        ws = %config.ws_bind_addr,
        path = %config.endpoint_path,
        "RF telemetry bridge starting"
    );

    let link = open_link(&config.serial)?;
    let server = BridgeServer::bind(config, link).await?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    server.run(running).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
