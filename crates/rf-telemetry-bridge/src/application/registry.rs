//! Client registry and telemetry fan-out.
//!
//! Every connected client owns a bounded queue.  The dispatcher publishes
//! each telemetry line into every queue with `try_send`, so one slow client
//! never delays the others or the serial thread:
//!
//! ```text
//!                        ┌─▶ client A queue ─▶ forwarder A ─▶ socket A
//! ingest queue ─▶ fan_out ├─▶ client B queue ─▶ forwarder B ─▶ socket B
//!                        └─▶ client C queue ─▶ forwarder C ─▶ socket C
//! ```
//!
//! A full queue drops the *newest* line for that client only and bumps its
//! drop counter.  A closed queue means the client is tearing down; it is
//! pruned from the registry on the spot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rf_telemetry_core::TelemetryLine;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

/// Identifier assigned to each WebSocket client on connect.
pub type ClientId = Uuid;

/// What happened to one published line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Clients whose queue accepted the line.
    pub delivered: usize,
    /// Clients whose queue was full; the line was dropped for them.
    pub dropped: usize,
    /// Clients whose queue was closed and who were removed.
    pub pruned: usize,
}

struct ClientSlot {
    tx: mpsc::Sender<TelemetryLine>,
    dropped: AtomicU64,
}

/// The set of connected clients and their telemetry queues.
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientSlot>>,
    /// Mirrors `clients.len()` so counting never waits on the lock.
    active_count: AtomicUsize,
    client_capacity: usize,
}

impl ClientRegistry {
    /// Creates an empty registry whose client queues hold `client_capacity`
    /// lines each.
    pub fn new(client_capacity: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
            client_capacity: client_capacity.max(1),
        }
    }

    /// Adds a client and returns its id and the receiving end of its queue.
    ///
    /// The client sees every line published after this call returns.
    pub async fn register(&self) -> (ClientId, mpsc::Receiver<TelemetryLine>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.client_capacity);
        let slot = ClientSlot {
            tx,
            dropped: AtomicU64::new(0),
        };

        let mut clients = self.clients.write().await;
        if clients.insert(id, slot).is_none() {
            self.active_count.fetch_add(1, Ordering::Relaxed);
        }
        (id, rx)
    }

    /// Removes a client, returning how many lines were dropped for it, or
    /// `None` if it was already gone.
    ///
    /// Dropping the slot closes the sending half of the client's queue, so a
    /// forwarder still draining it sees the end of the stream.
    pub async fn unregister(&self, id: ClientId) -> Option<u64> {
        let mut clients = self.clients.write().await;
        let slot = clients.remove(&id)?;
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        Some(slot.dropped.load(Ordering::Relaxed))
    }

    /// Offers `line` to every client queue without waiting.
    pub async fn publish(&self, line: &TelemetryLine) -> PublishReport {
        let mut report = PublishReport::default();
        let mut closed = Vec::new();

        {
            let clients = self.clients.read().await;
            for (id, slot) in clients.iter() {
                match slot.tx.try_send(line.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        let total = slot.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        report.dropped += 1;
                        trace!(client = %id, total_drops = total, "client queue full, line dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut clients = self.clients.write().await;
            for id in &closed {
                if clients.remove(id).is_some() {
                    self.active_count.fetch_sub(1, Ordering::Relaxed);
                    report.pruned += 1;
                    debug!(client = %id, "pruned client with closed queue");
                }
            }
        }

        report
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drains the ingest queue into the registry until the queue closes.
///
/// Returns the number of lines published.  The queue closes when the serial
/// owner thread exits.
pub async fn fan_out(
    mut ingest: mpsc::Receiver<TelemetryLine>,
    registry: Arc<ClientRegistry>,
) -> u64 {
    let mut published = 0u64;
    while let Some(line) = ingest.recv().await {
        let report = registry.publish(&line).await;
        published += 1;
        trace!(
            delivered = report.delivered,
            dropped = report.dropped,
            bytes = line.len(),
            "telemetry line published"
        );
    }
    debug!(published, "ingest queue closed; fan-out stopped");
    published
}

// ── Tests ─────────────────────────────────────────────────────────────────────
