//! Serial device access.
//!
//! Everything that touches the device goes through a [`SerialLink`]: a
//! blocking byte pipe whose reads return within a bounded timeout.  Exactly
//! one thread (see [`worker`]) owns the link and performs every read and
//! every write.
//!
//! Three implementations exist:
//!
//! | Link                      | Opened by              | Used for              |
//! |---------------------------|------------------------|-----------------------|
//! | [`hardware::HardwarePort`]| a device path          | real radios           |
//! | [`loopback::EchoLink`]    | the `loop://` URL      | demos without hardware|
//! | [`loopback::LoopbackLink`]| [`loopback::loopback_pair`] | tests            |

pub mod hardware;
pub mod loopback;
pub mod worker;

use std::io;

use thiserror::Error;
use tracing::info;

use crate::domain::SerialSettings;

pub use hardware::HardwarePort;
pub use loopback::{loopback_pair, DeviceEnd, EchoLink, LoopbackLink};
pub use worker::{spawn_serial_worker, CommandSender, SerialStats, SerialWorker, WorkerSettings};

/// Port name that opens an in-process echo link instead of a device.
pub const LOOP_URL: &str = "loop://";

/// Errors raised by serial links and the serial owner thread.
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("failed to open serial port '{port}': {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serial write failed: {0}")]
    Write(#[source] io::Error),

    #[error("serial owner thread has stopped")]
    WorkerStopped,

    #[error("failed to spawn serial owner thread: {0}")]
    Spawn(#[source] io::Error),
}

/// A blocking, exclusively owned connection to the serial device.
#[cfg_attr(test, mockall::automock)]
pub trait SerialLink: Send {
    /// Reads available bytes into `buf`.
    ///
    /// Blocks for at most the link's read timeout and returns `Ok(0)` when
    /// nothing arrived in that window.  Any `Err` means the device is gone.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `bytes` and flushes them to the device.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }
}

/// Opens the link named by `settings.port`.
///
/// `loop://` yields an [`EchoLink`]; anything else is opened as a hardware
/// serial port at `settings.baud_rate`.
///
/// # Errors
///
/// [`SerialError::Open`] when the device cannot be opened; the message names
/// the port.
pub fn open_link(settings: &SerialSettings) -> Result<Box<dyn SerialLink>, SerialError> {
    if settings.port == LOOP_URL {
        info!("using in-process echo link ({LOOP_URL})");
        return Ok(Box::new(EchoLink::new(settings.read_timeout)));
    }

    let port = HardwarePort::open(&settings.port, settings.baud_rate, settings.read_timeout)?;
    Ok(Box::new(port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BridgeConfig;

    #[test]
    fn test_open_link_loop_url_gives_echo() {
        // Arrange
        let settings = BridgeConfig::for_port(LOOP_URL).serial;

        // Act
        let mut link = open_link(&settings).unwrap();
        link.write_all(b"{\"ok\":true}\n").unwrap();
        let mut buf = [0u8; 64];
        let n = link.read(&mut buf).unwrap();

        // Assert
        assert_eq!(&buf[..n], b"{\"ok\":true}\n");
    }

    #[test]
    fn test_open_link_missing_device_names_port() {
        let settings = BridgeConfig::for_port("/dev/rf-telemetry-does-not-exist").serial;

        let err = open_link(&settings).err().unwrap();

        assert!(matches!(err, SerialError::Open { .. }));
        assert!(err.to_string().contains("/dev/rf-telemetry-does-not-exist"));
    }
}
