//! WebSocket server: accept loop, per-client sessions and orderly shutdown.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Starting the serial owner thread and the fan-out dispatcher.
//! 3. Upgrading each connection to a WebSocket session, but only on the
//!    configured endpoint path; any other path gets `404 Not Found`.
//! 4. Running each session: a forwarding task pushes the client's telemetry
//!    queue onto the socket while the session task reads command batches.
//! 5. Shutting everything down when the `running` flag is cleared or the
//!    serial device fails.
//!
//! # Task layout
//!
//! ```text
//!  rf-serial thread ─▶ ingest queue ─▶ fan_out task ─▶ client queues
//!                                                          │
//!  accept loop ─spawn─▶ session task ◀─ commands ─ socket  │
//!                          └─spawn─▶ forwarder ◀───────────┘
//!                                        └──▶ socket
//! ```
//!
//! # Shutdown
//!
//! The accept loop polls `running` every 200 ms.  On shutdown it broadcasts on
//! a `watch` channel; every session sends a Close frame, stops its forwarder
//! and unregisters.  A connection still in its opening handshake is dropped.
//! Sessions get two seconds to finish before they are aborted, then the
//! serial thread is stopped and joined.  A serial failure takes the same path
//! but `run` returns the error so the process exits non-zero.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{anyhow, Context};
use futures_util::{SinkExt, StreamExt};
use rf_telemetry_core::CommandBatch;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message as WsMessage,
    },
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::{dispatch_batch, fan_out, ClientId, ClientRegistry};
use crate::domain::{BridgeConfig, BridgeNotice};
use crate::infrastructure::serial::{
    spawn_serial_worker, CommandSender, SerialLink, SerialWorker, WorkerSettings,
};

const ACCEPT_POLL: Duration = Duration::from_millis(200);
/// Longest a peer may take to complete the WebSocket upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Longest a session waits to put its Close frame on the wire.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
/// How long shutdown waits for sessions before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type WsSink = futures_util::stream::SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type SharedSink = Arc<Mutex<WsSink>>;

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound, not yet running, bridge.
///
/// Binding and running are separate so callers (and tests) can learn the
/// actual listen address before any client connects.
pub struct BridgeServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: BridgeConfig,
    registry: Arc<ClientRegistry>,
    link: Box<dyn SerialLink>,
}

impl BridgeServer {
    /// Binds the WebSocket listener on `config.ws_bind_addr`.
    ///
    /// `link` must already be open; the serial owner thread starts in
    /// [`BridgeServer::run`].
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound (port in use, no
    /// permission).
    pub async fn bind(config: BridgeConfig, link: Box<dyn SerialLink>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.ws_bind_addr)
            .await
            .with_context(|| {
                format!(
                    "failed to bind WebSocket listener on {}",
                    config.ws_bind_addr
                )
            })?;
        let local_addr = listener
            .local_addr()
            .context("failed to read WebSocket listener address")?;
        let registry = Arc::new(ClientRegistry::new(config.queues.client_capacity));

        Ok(Self {
            listener,
            local_addr,
            config,
            registry,
            link,
        })
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle to the client registry.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Serves clients until `running` is cleared or the serial device fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the serial owner thread cannot be started or the
    /// device fails while the bridge is running.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let Self {
            listener,
            local_addr,
            config,
            registry,
            link,
        } = self;

        let serial_running = Arc::new(AtomicBool::new(true));
        let SerialWorker {
            telemetry,
            commands,
            mut exit,
            thread,
        } = spawn_serial_worker(
            link,
            WorkerSettings {
                ingest_capacity: config.queues.ingest_capacity,
                max_line_len: config.serial.max_line_len,
            },
            Arc::clone(&serial_running),
        )
        .context("failed to start serial owner thread")?;

        let dispatcher = tokio::spawn(fan_out(telemetry, Arc::clone(&registry)));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = SessionContext {
            registry: Arc::clone(&registry),
            commands,
            endpoint_path: Arc::from(config.endpoint_path.as_str()),
        };
        let mut sessions = JoinSet::new();

        info!(
            "telemetry bridge listening on ws://{local_addr}{}",
            config.endpoint_path
        );

        let outcome = loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break Ok(());
            }

            tokio::select! {
                accepted = timeout(ACCEPT_POLL, listener.accept()) => match accepted {
                    Ok(Ok((stream, peer_addr))) => {
                        debug!(%peer_addr, "new TCP connection");
                        sessions.spawn(handle_session(
                            stream,
                            peer_addr,
                            ctx.clone(),
                            shutdown_rx.clone(),
                        ));
                    }
                    Ok(Err(e)) => error!("accept error: {e}"),
                    // Timeout: loop back to check the running flag.
                    Err(_) => {}
                },
                serial = &mut exit => {
                    break Err(match serial {
                        Ok(Ok(_)) => anyhow!("serial owner thread stopped unexpectedly"),
                        Ok(Err(e)) => anyhow::Error::new(e).context("serial device failed"),
                        Err(_) => anyhow!("serial owner thread terminated without reporting"),
                    });
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("session task panicked: {e}");
                        }
                    }
                }
            }
        };

        // ── Shutdown ──────────────────────────────────────────────────────────
        info!(clients = registry.len(), "closing client sessions");
        drop(listener);
        let _ = shutdown_tx.send(true);
        let drained = timeout(SHUTDOWN_GRACE, async {
            while sessions.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            warn!(
                remaining = sessions.len(),
                "sessions did not finish in time; aborting them"
            );
            sessions.abort_all();
            while sessions.join_next().await.is_some() {}
        }
        drop(ctx);

        serial_running.store(false, Ordering::Relaxed);
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => debug!("serial owner thread joined"),
            Ok(Err(_)) => error!("serial owner thread panicked"),
            Err(e) => error!("failed to join serial owner thread: {e}"),
        }
        if let Ok(published) = dispatcher.await {
            debug!(published, "dispatcher finished");
        }

        if let Err(e) = &outcome {
            error!("bridge stopped: {e:#}");
        } else {
            info!("bridge stopped");
        }
        outcome
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

#[derive(Clone)]
struct SessionContext {
    registry: Arc<ClientRegistry>,
    commands: CommandSender,
    endpoint_path: Arc<str>,
}

/// Why a session's receive loop stopped.
#[derive(Debug)]
enum SessionEnd {
    ClientClosed,
    StreamEnded,
    ReadError(WsError),
    ForwarderStopped(String),
    Shutdown,
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientClosed => write!(f, "client closed the connection"),
            Self::StreamEnded => write!(f, "stream ended"),
            Self::ReadError(e) => write!(f, "read error: {e}"),
            Self::ForwarderStopped(reason) => write!(f, "send failed: {reason}"),
            Self::Shutdown => write!(f, "server shutdown"),
        }
    }
}

async fn handle_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: SessionContext,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = run_session(stream, peer_addr, ctx, shutdown).await {
        warn!(%peer_addr, "session ended with error: {e:#}");
    }
}

async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: SessionContext,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let endpoint_path = Arc::clone(&ctx.endpoint_path);
    let handshake = accept_hdr_async(stream, |request: &Request, response: Response| {
        check_endpoint_path(request, response, &endpoint_path)
    });
    let ws_stream = tokio::select! {
        upgraded = timeout(HANDSHAKE_TIMEOUT, handshake) => match upgraded {
            Ok(result) => {
                result.with_context(|| format!("WebSocket handshake with {peer_addr} failed"))?
            }
            Err(_) => {
                return Err(anyhow!(
                    "WebSocket handshake with {peer_addr} timed out after {HANDSHAKE_TIMEOUT:?}"
                ))
            }
        },
        _ = shutdown.changed() => {
            debug!(%peer_addr, "shutdown during handshake; dropping connection");
            return Ok(());
        }
    };

    let (client_id, mut telemetry) = ctx.registry.register().await;
    info!(
        client = %client_id,
        %peer_addr,
        clients = ctx.registry.len(),
        "client connected"
    );

    let (ws_tx, mut ws_rx) = ws_stream.split();
    let ws_tx: SharedSink = Arc::new(Mutex::new(ws_tx));

    // ── Forwarder: client queue → socket ──────────────────────────────────────
    let forward_tx = Arc::clone(&ws_tx);
    let mut forwarder = tokio::spawn(async move {
        while let Some(line) = telemetry.recv().await {
            let mut sink = forward_tx.lock().await;
            sink.send(WsMessage::Text(String::from(line))).await?;
        }
        Ok::<(), WsError>(())
    });
    let mut forwarder_done = false;

    // ── Receive loop: socket → serial ─────────────────────────────────────────
    let end = loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    handle_client_message(text.as_bytes(), client_id, &ctx, &ws_tx).await;
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    handle_client_message(&bytes, client_id, &ctx, &ws_tx).await;
                }
                Some(Ok(WsMessage::Close(_))) => break SessionEnd::ClientClosed,
                // Ping/Pong are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed)) => break SessionEnd::ClientClosed,
                Some(Err(e)) => break SessionEnd::ReadError(e),
                None => break SessionEnd::StreamEnded,
            },
            finished = &mut forwarder => {
                forwarder_done = true;
                break SessionEnd::ForwarderStopped(match finished {
                    Ok(Ok(())) => "client queue closed".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                });
            }
            _ = shutdown.changed() => break SessionEnd::Shutdown,
        }
    };

    // ── Teardown ──────────────────────────────────────────────────────────────
    if !forwarder_done {
        forwarder.abort();
        let _ = forwarder.await;
    }
    let dropped = ctx.registry.unregister(client_id).await.unwrap_or(0);

    {
        let mut sink = ws_tx.lock().await;
        let closing = match end {
            SessionEnd::Shutdown => {
                let away = WsMessage::Close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "server shutting down".into(),
                }));
                timeout(CLOSE_TIMEOUT, sink.send(away)).await
            }
            SessionEnd::ClientClosed => timeout(CLOSE_TIMEOUT, sink.close()).await,
            _ => Ok(Ok(())),
        };
        match closing {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(client = %client_id, "close handshake incomplete: {e}"),
            Err(_) => debug!(client = %client_id, "peer not reading; close frame abandoned"),
        }
    }

    info!(
        client = %client_id,
        %peer_addr,
        reason = %end,
        dropped_lines = dropped,
        clients = ctx.registry.len(),
        "client disconnected"
    );
    Ok(())
}

/// Parses one inbound frame and writes its commands to the device.
///
/// Malformed messages are logged and ignored; the connection stays open.
async fn handle_client_message(
    payload: &[u8],
    client_id: ClientId,
    ctx: &SessionContext,
    ws_tx: &SharedSink,
) {
    let batch = match CommandBatch::parse_slice(payload) {
        Ok(batch) => batch,
        Err(e) => {
            warn!(client = %client_id, "ignoring client message: {e}");
            return;
        }
    };
    debug!(client = %client_id, commands = batch.len(), "command batch received");

    let outcome = dispatch_batch(&batch, &ctx.commands).await;
    if outcome.is_complete() {
        return;
    }
    if let Some(notice) = &outcome.failure {
        send_notice(ws_tx, client_id, notice).await;
    }
}

async fn send_notice(ws_tx: &SharedSink, client_id: ClientId, notice: &BridgeNotice) {
    let text = match serde_json::to_string(notice) {
        Ok(text) => text,
        Err(e) => {
            error!(client = %client_id, "failed to serialize notice: {e}");
            return;
        }
    };
    let mut sink = ws_tx.lock().await;
    if let Err(e) = sink.send(WsMessage::Text(text)).await {
        debug!(client = %client_id, "failed to deliver notice: {e}");
    }
}

/// Handshake callback: only the configured path is upgraded.
///
/// The query string is ignored.
fn check_endpoint_path(
    request: &Request,
    response: Response,
    expected: &str,
) -> Result<Response, ErrorResponse> {
    let path = request.uri().path();
    if path == expected {
        return Ok(response);
    }
    debug!(path, "rejecting upgrade for unknown path");
    let mut rejection = ErrorResponse::new(Some(format!("no WebSocket endpoint at {path}")));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
