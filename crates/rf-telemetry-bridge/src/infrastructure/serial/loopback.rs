//! In-memory serial links.
//!
//! [`EchoLink`] plays back whatever is written to it, the way a physical
//! loopback plug would.  [`loopback_pair`] connects the bridge to a scripted
//! [`DeviceEnd`] that tests drive like a radio: it sends telemetry and reads
//! the command lines the bridge writes.  Dropping the [`DeviceEnd`] looks like
//! an unplugged device.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::SerialLink;

// ── EchoLink ──────────────────────────────────────────────────────────────────

/// A link whose reads return the bytes previously written to it.
pub struct EchoLink {
    pending: VecDeque<u8>,
    read_timeout: Duration,
}

impl EchoLink {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            read_timeout,
        }
    }
}

impl SerialLink for EchoLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            std::thread::sleep(self.read_timeout);
            return Ok(0);
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.pending.extend(bytes);
        Ok(())
    }
}

// ── Loopback pair ─────────────────────────────────────────────────────────────

/// Creates a connected link / device pair.
///
/// The link's reads wait at most `read_timeout` for the device to send.
pub fn loopback_pair(read_timeout: Duration) -> (LoopbackLink, DeviceEnd) {
    let (to_host, from_device) = mpsc::channel();
    let (to_device, from_host) = mpsc::channel();

    let link = LoopbackLink {
        from_device,
        to_device,
        pending: Vec::new(),
        read_timeout,
    };
    let device = DeviceEnd {
        to_host: Mutex::new(to_host),
        from_host: Mutex::new(from_host),
        inbox: Mutex::new(Vec::new()),
    };
    (link, device)
}

/// Bridge side of a [`loopback_pair`].
pub struct LoopbackLink {
    from_device: mpsc::Receiver<Vec<u8>>,
    to_device: mpsc::Sender<Vec<u8>>,
    /// Bytes received but not yet handed to a caller.
    pending: Vec<u8>,
    read_timeout: Duration,
}

impl SerialLink for LoopbackLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.from_device.recv_timeout(self.read_timeout) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => return Err(device_gone()),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.to_device
            .send(bytes.to_vec())
            .map_err(|_| device_gone())
    }
}

/// Device side of a [`loopback_pair`].
///
/// Safe to share between threads; tests usually hold it in an `Arc` and call
/// the blocking methods from `spawn_blocking`.
pub struct DeviceEnd {
    to_host: Mutex<mpsc::Sender<Vec<u8>>>,
    from_host: Mutex<mpsc::Receiver<Vec<u8>>>,
    /// Bytes written by the host but not yet returned by `read_line`.
    inbox: Mutex<Vec<u8>>,
}

impl DeviceEnd {
    /// Sends raw bytes to the bridge, exactly as given.
    pub fn send(&self, bytes: impl AsRef<[u8]>) -> io::Result<()> {
        let to_host = self.to_host.lock().map_err(|_| poisoned())?;
        to_host
            .send(bytes.as_ref().to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "bridge side closed"))
    }

    /// Sends `line` followed by a newline terminator.
    pub fn send_line(&self, line: &str) -> io::Result<()> {
        self.send(format!("{line}\n"))
    }

    /// Returns the next line written by the bridge, without its terminator.
    ///
    /// Waits up to `timeout`; `None` if no complete line arrived in time or
    /// the bridge side is closed.
    pub fn read_line(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let mut inbox = self.inbox.lock().ok()?;
        let from_host = self.from_host.lock().ok()?;

        loop {
            if let Some(pos) = inbox.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = inbox.drain(..=pos).collect();
                return Some(String::from_utf8_lossy(&line[..pos]).into_owned());
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match from_host.recv_timeout(remaining) {
                Ok(chunk) => inbox.extend_from_slice(&chunk),
                Err(_) => return None,
            }
        }
    }
}

fn device_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "loopback device disconnected")
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "loopback lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_echo_link_returns_written_bytes() {
        let mut link = EchoLink::new(SHORT);
        link.write_all(b"AT\n").unwrap();

        let mut buf = [0u8; 8];
        let n = link.read(&mut buf).unwrap();

        assert_eq!(&buf[..n], b"AT\n");
    }

    #[test]
    fn test_echo_link_times_out_when_empty() {
        let mut link = EchoLink::new(SHORT);
        let mut buf = [0u8; 8];
        assert_eq!(link.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_echo_link_splits_across_small_reads() {
        let mut link = EchoLink::new(SHORT);
        link.write_all(b"abcdef").unwrap();

        let mut buf = [0u8; 4];
        let first = link.read(&mut buf).unwrap();
        assert_eq!(&buf[..first], b"abcd");
        let second = link.read(&mut buf).unwrap();
        assert_eq!(&buf[..second], b"ef");
    }

    #[test]
    fn test_device_bytes_reach_link() {
        // Arrange
        let (mut link, device) = loopback_pair(SHORT);

        // Act
        device.send_line(r#"{"rssi":-71}"#).unwrap();
        let mut buf = [0u8; 64];
        let n = link.read(&mut buf).unwrap();

        // Assert
        assert_eq!(&buf[..n], b"{\"rssi\":-71}\n");
    }

    #[test]
    fn test_link_keeps_unread_remainder() {
        let (mut link, device) = loopback_pair(SHORT);
        device.send(b"0123456789").unwrap();

        let mut buf = [0u8; 6];
        assert_eq!(link.read(&mut buf).unwrap(), 6);
        let n = link.read(&mut buf).unwrap();

        assert_eq!(&buf[..n], b"6789");
    }

    #[test]
    fn test_link_read_times_out_with_zero() {
        let (mut link, _device) = loopback_pair(SHORT);
        let mut buf = [0u8; 8];
        assert_eq!(link.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_device_reads_lines_written_by_link() {
        let (mut link, device) = loopback_pair(SHORT);
        link.write_all(b"AT+ID?\nAT+FR").unwrap();
        link.write_all(b"EQ=915000000\n").unwrap();

        assert_eq!(device.read_line(SHORT).as_deref(), Some("AT+ID?"));
        assert_eq!(device.read_line(SHORT).as_deref(), Some("AT+FREQ=915000000"));
        assert_eq!(device.read_line(SHORT), None);
    }

    #[test]
    fn test_dropping_device_breaks_the_link() {
        let (mut link, device) = loopback_pair(SHORT);
        drop(device);

        let mut buf = [0u8; 8];
        let read_err = link.read(&mut buf).unwrap_err();
        let write_err = link.write_all(b"AT\n").unwrap_err();

        assert_eq!(read_err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(write_err.kind(), io::ErrorKind::BrokenPipe);
    }
}
