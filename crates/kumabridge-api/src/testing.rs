//! In-process fake Socket.IO server for tests.
//!
//! Speaks just enough Engine.IO v4 / Socket.IO v5 over a real WebSocket to
//! drive [`SocketClient`](crate::SocketClient) and everything built on it:
//! the open handshake, namespace connect, server pings, the Uptime Kuma
//! login exchange, scripted acknowledgements and server pushes.
//!
//! ```rust,ignore
//! let server = FakeServer::start(
//!     ServerScript::login_required("admin", "secret")
//!         .with_event("monitorList", vec![json!({})])
//!         .with_ack("add", json!({"ok": true, "monitorID": 7})),
//! )
//! .await;
//! let url = server.url();
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::packet::{EnginePacket, OpenInfo, SocketPacket};

// ── Script ───────────────────────────────────────────────────────────

/// How the fake server authenticates a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginMode {
    /// No authentication signal at all.
    Open,
    /// Authentication disabled: the server emits `autoLogin`.
    Auto,
    /// The server emits `loginRequired` and checks `login` against these.
    Required { username: String, password: String },
}

/// How the server answers a given event.
#[derive(Debug, Clone, PartialEq)]
pub enum AckReply {
    /// Acknowledge with this value as the single ack argument.
    Fixed(Value),
    /// Acknowledge with `{"ok": true, "echo": <first argument>}`.
    Echo,
}

/// Behaviour of every session accepted by a [`FakeServer`].
#[derive(Debug, Clone)]
pub struct ServerScript {
    pub login: LoginMode,
    /// Events pushed once the session is authenticated, before the
    /// readiness signal (`autoLogin` or the login ack).
    pub initial_events: Vec<(String, Vec<Value>)>,
    /// Events without an entry here are never acknowledged.
    pub acks: HashMap<String, AckReply>,
    pub ack_delay: Duration,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    /// When `false` the server never pings, so clients hit their ping timeout.
    pub send_pings: bool,
}

impl ServerScript {
    fn with_login(login: LoginMode) -> Self {
        Self {
            login,
            initial_events: Vec::new(),
            acks: HashMap::new(),
            ack_delay: Duration::ZERO,
            ping_interval: Duration::from_millis(25_000),
            ping_timeout: Duration::from_millis(20_000),
            send_pings: true,
        }
    }

    pub fn open() -> Self {
        Self::with_login(LoginMode::Open)
    }

    pub fn auto_login() -> Self {
        Self::with_login(LoginMode::Auto)
    }

    pub fn login_required(username: &str, password: &str) -> Self {
        Self::with_login(LoginMode::Required {
            username: username.to_owned(),
            password: password.to_owned(),
        })
    }

    #[must_use]
    pub fn with_event(mut self, name: &str, args: Vec<Value>) -> Self {
        self.initial_events.push((name.to_owned(), args));
        self
    }

    #[must_use]
    pub fn with_ack(mut self, event: &str, ack: Value) -> Self {
        self.acks.insert(event.to_owned(), AckReply::Fixed(ack));
        self
    }

    #[must_use]
    pub fn with_echo_ack(mut self, event: &str) -> Self {
        self.acks.insert(event.to_owned(), AckReply::Echo);
        self
    }

    #[must_use]
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    #[must_use]
    pub fn with_ping(mut self, interval: Duration, timeout: Duration) -> Self {
        self.ping_interval = interval;
        self.ping_timeout = timeout;
        self
    }

    #[must_use]
    pub fn without_pings(mut self) -> Self {
        self.send_pings = false;
        self
    }
}

// ── Recorded traffic ─────────────────────────────────────────────────

/// An event the server received from a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent {
    pub session: usize,
    pub name: String,
    pub args: Vec<Value>,
    pub ack_id: Option<u64>,
}

enum Command {
    Frame(String),
    Disconnect,
}

struct ServerInner {
    script: ServerScript,
    accepted: AtomicUsize,
    sessions: AtomicUsize,
    refuse: AtomicBool,
    received: Mutex<Vec<ReceivedEvent>>,
    clients: Mutex<Vec<mpsc::UnboundedSender<Command>>>,
}

impl ServerInner {
    fn record(&self, event: ReceivedEvent) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn broadcast(&self, make: impl Fn() -> Command) {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.retain(|tx| tx.send(make()).is_ok());
    }
}

// ── FakeServer ───────────────────────────────────────────────────────

/// A scripted Socket.IO server on an ephemeral localhost port.
///
/// Stops accepting and closes every session when dropped.
pub struct FakeServer {
    addr: SocketAddr,
    inner: Arc<ServerInner>,
    cancel: CancellationToken,
}

impl FakeServer {
    /// Bind `127.0.0.1:0` and start serving `script`.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    #[allow(clippy::unwrap_used)]
    pub async fn start(script: ServerScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let inner = Arc::new(ServerInner {
            script,
            accepted: AtomicUsize::new(0),
            sessions: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            received: Mutex::new(Vec::new()),
            clients: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();

        let accept_inner = Arc::clone(&inner);
        let accept_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    () = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                let Ok((stream, _)) = accepted else { continue };
                if accept_inner.refuse.load(Ordering::SeqCst) {
                    drop(stream);
                    continue;
                }
                let session_inner = Arc::clone(&accept_inner);
                let session_cancel = accept_cancel.child_token();
                tokio::spawn(async move {
                    let _ = serve_session(stream, session_inner, session_cancel).await;
                });
            }
        });

        Self {
            addr,
            inner,
            cancel,
        }
    }

    /// Destination URL for this server (`http://127.0.0.1:<port>`).
    ///
    /// # Panics
    ///
    /// Never in practice; the address is always a valid URL.
    #[allow(clippy::unwrap_used)]
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    /// Number of sessions that completed the namespace connect.
    pub fn sessions(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    /// Every event received from clients, in arrival order.
    pub fn received(&self) -> Vec<ReceivedEvent> {
        self.inner
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events received with the given name.
    pub fn received_named(&self, name: &str) -> Vec<ReceivedEvent> {
        self.received()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    /// Push an event to every connected session.
    ///
    /// # Panics
    ///
    /// Panics if `args` cannot be serialized.
    #[allow(clippy::unwrap_used)]
    pub fn push(&self, name: &str, args: Vec<Value>) {
        let frame = EnginePacket::Message(SocketPacket::event(name, args))
            .encode()
            .unwrap();
        self.inner.broadcast(|| Command::Frame(frame.clone()));
    }

    /// Send a raw Engine.IO frame to every connected session.
    pub fn push_raw(&self, frame: &str) {
        self.inner.broadcast(|| Command::Frame(frame.to_owned()));
    }

    /// Disconnect every session with a Socket.IO `41` and a close frame.
    pub fn disconnect_all(&self) {
        self.inner.broadcast(|| Command::Disconnect);
    }

    /// While `true`, new TCP connections are dropped before the upgrade.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Session ──────────────────────────────────────────────────────────

type SessionError = Box<dyn std::error::Error + Send + Sync>;

async fn serve_session(
    stream: TcpStream,
    inner: Arc<ServerInner>,
    cancel: CancellationToken,
) -> Result<(), SessionError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws.split();
    let script = &inner.script;

    let session = inner.accepted.fetch_add(1, Ordering::SeqCst) + 1;
    let sid = format!("fake-{session}");
    let open = OpenInfo {
        sid: sid.clone(),
        upgrades: Vec::new(),
        ping_interval: millis(script.ping_interval),
        ping_timeout: millis(script.ping_timeout),
        max_payload: Some(1_000_000),
    };
    write
        .send(text(EnginePacket::Open(open).encode()?))
        .await?;

    // Wait for the namespace connect.
    loop {
        let Some(frame) = read.next().await else {
            return Ok(());
        };
        if let Message::Text(t) = frame? {
            if t.as_str().starts_with("40") {
                break;
            }
        }
    }
    inner.sessions.fetch_add(1, Ordering::SeqCst);
    write
        .send(text(
            EnginePacket::Message(SocketPacket::Connect(Some(json!({ "sid": sid })))).encode()?,
        ))
        .await?;

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    inner
        .clients
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(cmd_tx);
    let (delayed_tx, mut delayed_rx) = mpsc::unbounded_channel::<String>();

    match &script.login {
        LoginMode::Open => send_initial_events(&mut write, script).await?,
        LoginMode::Auto => {
            send_initial_events(&mut write, script).await?;
            write.send(event_frame("autoLogin", Vec::new())?).await?;
        }
        LoginMode::Required { .. } => {
            write.send(event_frame("loginRequired", Vec::new())?).await?;
        }
    }

    let mut ping = tokio::time::interval(script.ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            _ = ping.tick(), if script.send_pings => {
                write.send(text("2".to_owned())).await?;
            }
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Frame(frame)) => write.send(text(frame)).await?,
                Some(Command::Disconnect) | None => {
                    let _ = write.send(text("41".to_owned())).await;
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            },
            Some(frame) = delayed_rx.recv() => write.send(text(frame)).await?,
            frame = read.next() => {
                let Some(frame) = frame else { return Ok(()) };
                let Message::Text(t) = frame? else { continue };
                let Ok(EnginePacket::Message(SocketPacket::Event { id, name, args })) =
                    EnginePacket::decode(t.as_str())
                else {
                    continue;
                };
                inner.record(ReceivedEvent {
                    session,
                    name: name.clone(),
                    args: args.clone(),
                    ack_id: id,
                });

                if name == "login" {
                    if let (LoginMode::Required { username, password }, Some(id)) = (&script.login, id) {
                        let creds = args.first();
                        let accepted = creds.and_then(|c| c.get("username")).and_then(Value::as_str)
                            == Some(username.as_str())
                            && creds.and_then(|c| c.get("password")).and_then(Value::as_str)
                                == Some(password.as_str());
                        let reply = if accepted {
                            send_initial_events(&mut write, script).await?;
                            json!({ "ok": true, "token": "fake-token" })
                        } else {
                            json!({ "ok": false, "msg": "Incorrect username or password." })
                        };
                        write.send(text(ack_frame(id, reply)?)).await?;
                    }
                    continue;
                }

                let (Some(id), Some(reply)) = (id, script.acks.get(&name)) else {
                    continue;
                };
                let value = match reply {
                    AckReply::Fixed(value) => value.clone(),
                    AckReply::Echo => json!({
                        "ok": true,
                        "echo": args.first().cloned().unwrap_or(Value::Null),
                    }),
                };
                let frame = ack_frame(id, value)?;
                if script.ack_delay.is_zero() {
                    write.send(text(frame)).await?;
                } else {
                    let tx = delayed_tx.clone();
                    let delay = script.ack_delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(frame);
                    });
                }
            }
        }
    }
}

async fn send_initial_events<S>(write: &mut S, script: &ServerScript) -> Result<(), SessionError>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    for (name, args) in &script.initial_events {
        write.send(event_frame(name, args.clone())?).await?;
    }
    Ok(())
}

fn event_frame(name: &str, args: Vec<Value>) -> Result<Message, SessionError> {
    Ok(text(
        EnginePacket::Message(SocketPacket::event(name, args)).encode()?,
    ))
}

fn ack_frame(id: u64, value: Value) -> Result<String, SessionError> {
    Ok(EnginePacket::Message(SocketPacket::Ack {
        id,
        args: vec![value],
    })
    .encode()?)
}

fn text(frame: String) -> Message {
    Message::Text(frame.into())
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
