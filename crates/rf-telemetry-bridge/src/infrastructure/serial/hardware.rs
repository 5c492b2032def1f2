//! Hardware serial port backed by the `serialport` crate.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use super::{SerialError, SerialLink};

/// A real serial device opened 8N1 with no flow control.
pub struct HardwarePort {
    port: Box<dyn SerialPort>,
}

impl HardwarePort {
    /// Opens `path` at `baud_rate`; reads block for at most `read_timeout`.
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, SerialError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|source| SerialError::Open {
                port: path.to_string(),
                source,
            })?;

        info!(port = path, baud_rate, "serial port opened");
        Ok(Self { port })
    }
}

impl SerialLink for HardwarePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_timeout_error(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, bytes)?;
        self.port.flush()
    }
}

/// Returns `true` for the errors a timed read reports when no data arrived.
fn is_timeout_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_timeout_error_recognises_timed_out() {
        let e = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_recognises_would_block() {
        let e = io::Error::new(io::ErrorKind::WouldBlock, "would block");
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_returns_false_for_device_loss() {
        let e = io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged");
        assert!(!is_timeout_error(&e));
    }

    #[test]
    fn test_open_nonexistent_port_fails_with_port_name() {
        let result = HardwarePort::open(
            "/dev/rf-telemetry-missing",
            115_200,
            Duration::from_millis(50),
        );

        match result {
            Err(SerialError::Open { port, .. }) => assert_eq!(port, "/dev/rf-telemetry-missing"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing device must fail"),
        }
    }
}
