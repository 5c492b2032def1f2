//! The serial owner thread.
//!
//! One dedicated OS thread (`rf-serial`) owns the [`SerialLink`] and is the
//! only code that ever reads from or writes to the device.  The async side
//! talks to it purely through channels:
//!
//! ```text
//!             ┌──────────── rf-serial thread ────────────┐
//!  device ──▶ │ read (≤ timeout) ─▶ LineFramer ─▶ try_send│──▶ ingest queue
//!             │                                          │
//!  device ◀── │ write_all ◀── try_recv ◀──────────────────│◀── write requests
//!             └──────────────────────────────────────────┘      (+ oneshot reply)
//! ```
//!
//! # Loop
//!
//! Each turn the thread first drains every pending write request, then does
//! one bounded read.  Because reads time out, a queued write waits at most one
//! read timeout, and the shutdown flag is noticed within the same bound.
//!
//! # Failure
//!
//! A read error other than `Interrupted` means the device is gone: the thread
//! exits and reports the error through its exit channel, which the server
//! treats as fatal.  A write error is returned to the requesting client and
//! the thread keeps running; if the device really died the next read fails.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use rf_telemetry_core::{encode_command, LineFramer, TelemetryLine};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use super::{SerialError, SerialLink};
use crate::application::CommandSink;

/// Capacity of the write-request queue.
pub const WRITE_QUEUE_CAPACITY: usize = 64;

const READ_BUF_LEN: usize = 4096;
const THREAD_NAME: &str = "rf-serial";

/// Tunables for the owner thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub ingest_capacity: usize,
    pub max_line_len: usize,
}

/// Counters reported when the owner thread exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SerialStats {
    pub lines_forwarded: u64,
    pub lines_rejected: u64,
    /// Valid lines dropped because the ingest queue was full.
    pub lines_dropped: u64,
    pub commands_written: u64,
    pub write_failures: u64,
}

/// Handles returned by [`spawn_serial_worker`].
pub struct SerialWorker {
    /// Validated telemetry lines, in device order.
    pub telemetry: mpsc::Receiver<TelemetryLine>,
    /// Cloneable handle for writing commands.
    pub commands: CommandSender,
    /// Resolves when the thread exits; `Err` means the device failed.
    pub exit: oneshot::Receiver<Result<SerialStats, SerialError>>,
    pub thread: JoinHandle<()>,
}

struct WriteRequest {
    command: String,
    reply: oneshot::Sender<Result<(), SerialError>>,
}

/// Async handle for writing command lines through the owner thread.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<WriteRequest>,
}

impl CommandSender {
    /// Queues `command` for writing and waits for the result.
    ///
    /// The command is terminated with exactly one newline before it hits the
    /// device.
    ///
    /// # Errors
    ///
    /// [`SerialError::Write`] if the device rejected the write,
    /// [`SerialError::WorkerStopped`] if the owner thread is gone.
    pub async fn write_line(&self, command: &str) -> Result<(), SerialError> {
        let (reply, result) = oneshot::channel();
        let request = WriteRequest {
            command: command.to_string(),
            reply,
        };
        self.tx
            .send(request)
            .await
            .map_err(|_| SerialError::WorkerStopped)?;
        result.await.map_err(|_| SerialError::WorkerStopped)?
    }
}

#[async_trait]
impl CommandSink for CommandSender {
    async fn write_command(&self, command: &str) -> Result<(), String> {
        self.write_line(command).await.map_err(|e| e.to_string())
    }
}

/// Starts the owner thread for `link`.
///
/// The thread runs until `running` is cleared, the telemetry receiver is
/// dropped, or the device fails.
///
/// # Errors
///
/// [`SerialError::Spawn`] if the OS refuses to create the thread.
pub fn spawn_serial_worker<L>(
    link: L,
    settings: WorkerSettings,
    running: Arc<AtomicBool>,
) -> Result<SerialWorker, SerialError>
where
    L: SerialLink + 'static,
{
    let (ingest_tx, ingest_rx) = mpsc::channel(settings.ingest_capacity.max(1));
    let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
    let (exit_tx, exit_rx) = oneshot::channel();
    let framer = LineFramer::with_max_line_len(settings.max_line_len);

    let thread = std::thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || {
            let outcome = serial_loop(link, framer, ingest_tx, write_rx, running);
            match &outcome {
                Ok(stats) => info!(
                    forwarded = stats.lines_forwarded,
                    rejected = stats.lines_rejected,
                    dropped = stats.lines_dropped,
                    commands = stats.commands_written,
                    "serial owner thread stopped"
                ),
                Err(e) => error!("serial owner thread failed: {e}"),
            }
            let _ = exit_tx.send(outcome);
        })
        .map_err(SerialError::Spawn)?;

    info!(
        ingest_capacity = settings.ingest_capacity,
        max_line_len = settings.max_line_len,
        "serial owner thread started"
    );

    Ok(SerialWorker {
        telemetry: ingest_rx,
        commands: CommandSender { tx: write_tx },
        exit: exit_rx,
        thread,
    })
}

fn serial_loop<L: SerialLink>(
    mut link: L,
    mut framer: LineFramer,
    ingest: mpsc::Sender<TelemetryLine>,
    mut writes: mpsc::Receiver<WriteRequest>,
    running: Arc<AtomicBool>,
) -> Result<SerialStats, SerialError> {
    let mut stats = SerialStats::default();
    let mut buf = vec![0u8; READ_BUF_LEN];

    while running.load(Ordering::Relaxed) {
        drain_writes(&mut link, &mut writes, &mut stats);

        let n = match link.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SerialError::Io(e)),
        };

        for outcome in framer.feed(&buf[..n]) {
            let line = match outcome {
                Ok(line) => line,
                Err(reason) => {
                    stats.lines_rejected += 1;
                    debug!(%reason, "telemetry line rejected");
                    continue;
                }
            };
            match ingest.try_send(line) {
                Ok(()) => stats.lines_forwarded += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    stats.lines_dropped += 1;
                    trace!(total = stats.lines_dropped, "ingest queue full, line dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("ingest queue closed; stopping serial owner");
                    return Ok(stats);
                }
            }
        }
    }

    Ok(stats)
}

/// Performs every write request queued so far, replying to each.
fn drain_writes<L: SerialLink>(
    link: &mut L,
    writes: &mut mpsc::Receiver<WriteRequest>,
    stats: &mut SerialStats,
) {
    while let Ok(request) = writes.try_recv() {
        let result = match link.write_all(&encode_command(&request.command)) {
            Ok(()) => {
                stats.commands_written += 1;
                Ok(())
            }
            Err(e) => {
                stats.write_failures += 1;
                warn!(command = %request.command, "serial write failed: {e}");
                Err(SerialError::Write(e))
            }
        };
        // The requester may have gone away; the write already happened.
        let _ = request.reply.send(result);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
