//! Socket.IO client with auto-reconnect.
//!
//! Connects to a Socket.IO server over a WebSocket and keeps the session
//! alive in a background task: answers Engine.IO pings, watches for ping
//! timeouts, and reconnects with exponential backoff + jitter.
//!
//! Server-pushed events are forwarded, in arrival order, through a
//! bounded [`tokio::sync::mpsc`] channel to a single consumer.
//! Acknowledgements are routed straight to the caller that is waiting
//! for them and never appear on that channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use kumabridge_api::client::{SocketClient, SocketEvent};
//! use kumabridge_api::transport::ReconnectConfig;
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let url = Url::parse("http://127.0.0.1:3001")?;
//! let (client, mut events) =
//!     SocketClient::connect(&url, ReconnectConfig::default(), CancellationToken::new())?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SocketEvent::Event { name, .. } = event {
//!         println!("{name}");
//!     }
//! }
//!
//! client.shutdown();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::packet::{EnginePacket, OpenInfo, SocketPacket, connect_error_message};
use crate::transport::{ReconnectConfig, calculate_backoff, socket_url};

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on open + namespace connect, before ping tracking starts.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsRead = SplitStream<WsStream>;
type WsWrite = SplitSink<WsStream, Message>;

// ── ConnectionState ──────────────────────────────────────────────────

/// Transport state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// First connection attempt in progress.
    Connecting,
    /// Namespace connect acknowledged; emits are accepted.
    Connected,
    /// Session lost; the background loop is retrying.
    Reconnecting { attempt: u32 },
    /// The background loop has exited (shutdown or retries exhausted).
    Closed,
}

// ── SocketEvent ──────────────────────────────────────────────────────

/// Something the consumer of a [`SocketClient`] needs to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A session reached the connected state (first time or after a reconnect).
    Connected { sid: Option<String> },

    /// A session ended, or a connection attempt failed.
    Disconnected { reason: String },

    /// A server-pushed event.
    Event { name: String, args: Vec<Value> },
}

/// Receiving half of the ordered event stream.
pub type EventReceiver = mpsc::Receiver<SocketEvent>;

// ── SocketClient ─────────────────────────────────────────────────────

/// Handle to a running Socket.IO connection.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Call
/// [`shutdown`](Self::shutdown) to tear down the background task.
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    url: Url,
    outbound: mpsc::Sender<String>,
    pending: DashMap<u64, oneshot::Sender<Vec<Value>>>,
    next_ack_id: AtomicU64,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl SocketClient {
    /// Spawn the connection loop for `destination`.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. Watch the returned receiver for
    /// [`SocketEvent::Connected`] or [`SocketEvent::Disconnected`].
    pub fn connect(
        destination: &Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<(Self, EventReceiver), Error> {
        let url = socket_url(destination)?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Connecting);

        let inner = Arc::new(ClientInner {
            url,
            outbound,
            pending: DashMap::new(),
            next_ack_id: AtomicU64::new(0),
            state,
            cancel,
        });

        let task_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            socket_loop(task_inner, reconnect, outbound_rx, event_tx).await;
        });

        Ok((Self { inner }, event_rx))
    }

    /// The Socket.IO endpoint this client connects to.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.state.borrow() == ConnectionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.state.borrow() == ConnectionState::Closed
    }

    /// Number of emits still waiting for an acknowledgement.
    pub fn pending_acks(&self) -> usize {
        self.inner.pending.len()
    }

    /// Emit an event without asking for an acknowledgement.
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let frame = EnginePacket::Message(SocketPacket::event(event, args)).encode()?;
        self.send_frame(frame).await
    }

    /// Emit an event and wait for the server's acknowledgement.
    ///
    /// Resolves with the acknowledgement arguments. The wait itself has
    /// no deadline; wrap the call in [`tokio::time::timeout`]. Dropping
    /// the future releases the acknowledgement slot, so an ack arriving
    /// afterwards is discarded by the connection task.
    pub async fn emit_with_ack(&self, event: &str, args: Vec<Value>) -> Result<Vec<Value>, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let id = self.inner.next_ack_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id, tx);
        let _slot = AckSlot {
            id,
            pending: &self.inner.pending,
        };

        // The session may have dropped between the state check and the
        // insert, in which case nobody would ever fail this slot.
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let frame = EnginePacket::Message(SocketPacket::Event {
            id: Some(id),
            name: event.to_owned(),
            args,
        })
        .encode()?;
        self.send_frame(frame).await?;

        rx.await.map_err(|_| Error::Disconnected {
            reason: "connection lost before acknowledgement".into(),
        })
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    async fn send_frame(&self, frame: String) -> Result<(), Error> {
        self.inner
            .outbound
            .send(frame)
            .await
            .map_err(|_| Error::NotConnected)
    }
}

impl std::fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClient")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ClientInner {
    /// Hand an acknowledgement to its waiting caller, if it is still waiting.
    fn resolve_ack(&self, id: u64, args: Vec<Value>) {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                // The receiver may be gone if the caller was dropped
                // between our remove and its own cleanup.
                let _ = tx.send(args);
            }
            None => tracing::debug!(id, url = %self.url, "Ignoring ack with no waiting caller"),
        }
    }

    /// Fail every outstanding acknowledgement. Dropping the senders makes
    /// each waiting receiver resolve with an error.
    fn fail_pending(&self) {
        let outstanding = self.pending.len();
        if outstanding > 0 {
            tracing::debug!(outstanding, url = %self.url, "Failing pending acks");
        }
        self.pending.clear();
    }
}

/// Removes an acknowledgement slot when the waiting future finishes or
/// is dropped.
struct AckSlot<'a> {
    id: u64,
    pending: &'a DashMap<u64, oneshot::Sender<Vec<Value>>>,
}

impl Drop for AckSlot<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → run session → on end, backoff → reconnect.
async fn socket_loop(
    inner: Arc<ClientInner>,
    reconnect: ReconnectConfig,
    mut outbound_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<SocketEvent>,
) {
    let mut attempt: u32 = 0;

    loop {
        // Frames queued for a previous session belong to callers that
        // have already been failed.
        while outbound_rx.try_recv().is_ok() {}

        let result = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            result = run_session(&inner, &mut outbound_rx, &event_tx) => result,
        };

        let (reason, clean) = match result {
            // Clean end of a session (close frame, server disconnect).
            // Reset attempt counter and reconnect immediately.
            Ok(reason) => {
                tracing::info!(url = %inner.url, %reason, "Socket.IO session ended, reconnecting");
                attempt = 0;
                (reason, true)
            }
            Err(e) => {
                tracing::warn!(url = %inner.url, error = %e, attempt, "Socket.IO connection error");
                (e.to_string(), false)
            }
        };

        // Leave Connected before failing pending acks.
        inner
            .state
            .send_replace(ConnectionState::Reconnecting { attempt });
        inner.fail_pending();
        let _ = event_tx.send(SocketEvent::Disconnected { reason }).await;

        if clean {
            continue;
        }

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                tracing::error!(
                    url = %inner.url,
                    max_retries = max,
                    "Socket.IO reconnection limit reached, giving up"
                );
                break;
            }
        }

        let delay = calculate_backoff(attempt, &reconnect);
        tracing::info!(
            url = %inner.url,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    inner.state.send_replace(ConnectionState::Closed);
    inner.fail_pending();
    tracing::debug!(url = %inner.url, "Socket.IO loop exiting");
}

// ── Single session lifecycle ─────────────────────────────────────────

/// Connect, handshake, then pump frames until the session ends.
///
/// `Ok(reason)` is a clean end (server disconnect, close frame);
/// `Err` is anything that should go through backoff.
async fn run_session(
    inner: &ClientInner,
    outbound_rx: &mut mpsc::Receiver<String>,
    event_tx: &mpsc::Sender<SocketEvent>,
) -> Result<String, Error> {
    tracing::info!(url = %inner.url, "Connecting to Socket.IO endpoint");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(inner.url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    let (open, sid) = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut read, &mut write))
        .await
        .map_err(|_| Error::Protocol("handshake timed out".into()))??;

    inner.state.send_replace(ConnectionState::Connected);
    tracing::info!(
        url = %inner.url,
        sid = sid.as_deref().unwrap_or(""),
        ping_interval_ms = open.ping_interval,
        "Socket.IO connected"
    );
    let _ = event_tx.send(SocketEvent::Connected { sid }).await;

    let ping_window = open.ping_deadline();
    let mut ping_deadline = Instant::now() + ping_window;

    loop {
        tokio::select! {
            biased;
            () = tokio::time::sleep_until(ping_deadline) => {
                return Err(Error::PingTimeout {
                    timeout_ms: open.ping_interval.saturating_add(open.ping_timeout),
                });
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match handle_frame(inner, text.as_str(), event_tx).await? {
                            Flow::Continue => {}
                            Flow::Reply(reply) => {
                                ping_deadline = Instant::now() + ping_window;
                                write.send(Message::Text(reply.into())).await.map_err(ws_error)?;
                            }
                            Flow::End(reason) => return Ok(reason),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        log_close_frame(frame.as_ref());
                        return Ok("transport close".into());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!("Ignoring binary WebSocket frame");
                    }
                    Some(Ok(_)) => {
                        // Ping, Pong, raw Frame -- tungstenite answers pings itself
                    }
                    Some(Err(e)) => return Err(ws_error(e)),
                    None => {
                        tracing::info!(url = %inner.url, "WebSocket stream ended");
                        return Ok("transport close".into());
                    }
                }
            }
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    return Ok("io client disconnect".into());
                };
                write.send(Message::Text(frame.into())).await.map_err(ws_error)?;
            }
        }
    }
}

/// Wait for the Engine.IO `open` packet, send the namespace connect and
/// wait for the server to accept it.
async fn handshake(
    read: &mut WsRead,
    write: &mut WsWrite,
) -> Result<(OpenInfo, Option<String>), Error> {
    let mut open: Option<OpenInfo> = None;

    loop {
        let text = next_text(read).await?;
        match EnginePacket::decode(&text)? {
            EnginePacket::Open(info) => {
                let connect = EnginePacket::Message(SocketPacket::Connect(None)).encode()?;
                write
                    .send(Message::Text(connect.into()))
                    .await
                    .map_err(ws_error)?;
                open = Some(info);
            }
            EnginePacket::Ping(payload) => {
                let pong = EnginePacket::Pong(payload).encode()?;
                write
                    .send(Message::Text(pong.into()))
                    .await
                    .map_err(ws_error)?;
            }
            EnginePacket::Message(SocketPacket::Connect(data)) => {
                let Some(info) = open else {
                    return Err(Error::Protocol("namespace connect before open".into()));
                };
                let sid = data
                    .as_ref()
                    .and_then(|d| d.get("sid"))
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                return Ok((info, sid));
            }
            EnginePacket::Message(SocketPacket::ConnectError(data)) => {
                return Err(Error::ConnectRejected {
                    message: connect_error_message(&data),
                });
            }
            EnginePacket::Close => {
                return Err(Error::Protocol("server closed during handshake".into()));
            }
            other => tracing::trace!(?other, "Ignoring packet during handshake"),
        }
    }
}

// ── Frame handling ───────────────────────────────────────────────────

enum Flow {
    Continue,
    /// Send this frame back and refresh the ping deadline.
    Reply(String),
    /// The session ended cleanly with this reason.
    End(String),
}

async fn handle_frame(
    inner: &ClientInner,
    text: &str,
    event_tx: &mpsc::Sender<SocketEvent>,
) -> Result<Flow, Error> {
    let packet = match EnginePacket::decode(text) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to decode Socket.IO frame");
            return Ok(Flow::Continue);
        }
    };

    match packet {
        EnginePacket::Ping(payload) => Ok(Flow::Reply(EnginePacket::Pong(payload).encode()?)),
        EnginePacket::Close => Ok(Flow::End("transport close".into())),
        EnginePacket::Message(SocketPacket::Event { id, name, args }) => {
            if let Some(id) = id {
                tracing::debug!(id, event = %name, "Server requested an ack; not supported");
            }
            // A dropped consumer just means nobody is listening any more.
            let _ = event_tx.send(SocketEvent::Event { name, args }).await;
            Ok(Flow::Continue)
        }
        EnginePacket::Message(SocketPacket::Ack { id, args }) => {
            inner.resolve_ack(id, args);
            Ok(Flow::Continue)
        }
        EnginePacket::Message(SocketPacket::Disconnect) => {
            Ok(Flow::End("io server disconnect".into()))
        }
        EnginePacket::Message(SocketPacket::ConnectError(data)) => Err(Error::ConnectRejected {
            message: connect_error_message(&data),
        }),
        other => {
            tracing::trace!(?other, "Ignoring packet");
            Ok(Flow::Continue)
        }
    }
}

async fn next_text(read: &mut WsRead) -> Result<String, Error> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Close(frame))) => {
                log_close_frame(frame.as_ref());
                return Err(match frame {
                    Some(cf) => Error::WebSocketClosed {
                        code: u16::from(cf.code),
                        reason: cf.reason.as_str().to_owned(),
                    },
                    None => Error::WebSocketClosed {
                        code: 1005,
                        reason: "no close frame payload".into(),
                    },
                });
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ws_error(e)),
            None => {
                return Err(Error::WebSocketClosed {
                    code: 1006,
                    reason: "stream ended".into(),
                });
            }
        }
    }
}

fn log_close_frame(frame: Option<&CloseFrame>) {
    if let Some(cf) = frame {
        tracing::info!(
            code = u16::from(cf.code),
            reason = cf.reason.as_str(),
            "WebSocket close frame received"
        );
    } else {
        tracing::info!("WebSocket close frame received (no payload)");
    }
}

fn ws_error(e: tokio_tungstenite::tungstenite::Error) -> Error {
    Error::WebSocketConnect(e.to_string())
}
