// ── Authenticated connection establishment ──
//
// connect → (optional) login → ready. A per-connection event pump owns
// the transport's event stream for the connection's whole life: it
// decides readiness, answers login challenges and feeds the monitor
// cache.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use kumabridge_api::{EventReceiver, SocketClient, SocketEvent};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use crate::ack;
use crate::config::{BridgeSettings, Credentials};
use crate::connection::Connection;
use crate::error::CoreError;
use crate::model::Destination;
use crate::store::MonitorCache;
use crate::sync;

pub const LOGIN_REQUIRED: &str = "loginRequired";
pub const AUTO_LOGIN: &str = "autoLogin";
pub const LOGIN: &str = "login";

type Ready = oneshot::Sender<Result<(), CoreError>>;

/// Open a connection to `destination` and wait until it is usable.
///
/// On any failure the transport is shut down before returning, so a
/// failed attempt leaves nothing running in the background.
pub(crate) async fn establish(
    destination: &Destination,
    credentials: &Credentials,
    settings: &BridgeSettings,
    cancel: CancellationToken,
) -> Result<Arc<Connection>, CoreError> {
    tracing::info!(%destination, user = %credentials.username, "Establishing connection");

    let (client, events) =
        SocketClient::connect(destination.url(), settings.reconnect.clone(), cancel)?;
    let guard = ShutdownOnDrop(Some(client.clone()));
    let cache = Arc::new(MonitorCache::new());
    let (ready_tx, ready_rx) = oneshot::channel();

    let pump = EventPump {
        destination: destination.clone(),
        client: client.clone(),
        cache: Arc::clone(&cache),
        credentials: credentials.clone(),
        login_grace: settings.login_grace,
        ack_timeout: settings.ack_timeout,
        ready: Some(ready_tx),
    };
    tokio::spawn(pump.run(events));

    let outcome = match tokio::time::timeout(settings.connect_timeout, ready_rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(CoreError::transport("connection closed before it became ready")),
        Err(_) => Err(CoreError::transport(format!(
            "not ready within {}ms",
            settings.connect_timeout.as_millis()
        ))),
    };

    match outcome {
        Ok(()) => {
            guard.disarm();
            tracing::info!(%destination, "Connection ready");
            Ok(Arc::new(Connection::new(destination.clone(), client, cache)))
        }
        Err(e) => {
            tracing::warn!(%destination, error = %e, "Connection establishment failed");
            Err(e)
        }
    }
}

/// Shuts the transport down unless disarmed, including when the
/// establishing future is dropped midway.
struct ShutdownOnDrop(Option<SocketClient>);

impl ShutdownOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        if let Some(client) = self.0.take() {
            client.shutdown();
        }
    }
}

// ── Event pump ───────────────────────────────────────────────────────

struct EventPump {
    destination: Destination,
    client: SocketClient,
    cache: Arc<MonitorCache>,
    credentials: Credentials,
    login_grace: Duration,
    ack_timeout: Duration,
    /// Present until the establishment outcome is known.
    ready: Option<Ready>,
}

impl EventPump {
    async fn run(mut self, mut events: EventReceiver) {
        let (login_tx, mut login_rx) = mpsc::channel(4);
        let mut grace: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                biased;
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.handle(event, &mut grace, &login_tx);
                }
                Some(result) = login_rx.recv() => self.login_finished(result),
                () = until_grace(&mut grace) => {
                    grace = None;
                    tracing::debug!(destination = %self.destination, "No login challenge, treating server as open");
                    self.resolve(Ok(()));
                }
            }
        }

        self.resolve(Err(CoreError::transport("connection closed")));
        tracing::debug!(destination = %self.destination, "Event pump finished");
    }

    fn handle(
        &mut self,
        event: SocketEvent,
        grace: &mut Option<Pin<Box<Sleep>>>,
        login_tx: &mpsc::Sender<Result<(), CoreError>>,
    ) {
        match event {
            SocketEvent::Connected { sid } => {
                if self.ready.is_some() {
                    *grace = Some(Box::pin(tokio::time::sleep(self.login_grace)));
                } else {
                    tracing::info!(destination = %self.destination, sid = sid.as_deref().unwrap_or(""), "Reconnected");
                }
            }
            SocketEvent::Disconnected { reason } => {
                *grace = None;
                if self.ready.is_some() {
                    self.resolve(Err(CoreError::Transport { reason }));
                } else {
                    tracing::warn!(destination = %self.destination, %reason, "Connection lost");
                }
            }
            SocketEvent::Event { name, args } => match name.as_str() {
                LOGIN_REQUIRED => {
                    *grace = None;
                    self.spawn_login(login_tx.clone());
                }
                AUTO_LOGIN => {
                    *grace = None;
                    tracing::debug!(destination = %self.destination, "Server has authentication disabled");
                    self.resolve(Ok(()));
                }
                _ => {
                    if !sync::apply_event(&self.cache, &name, &args) {
                        tracing::trace!(destination = %self.destination, event = %name, "Unhandled server event");
                    }
                }
            },
        }
    }

    fn spawn_login(&self, results: mpsc::Sender<Result<(), CoreError>>) {
        tracing::debug!(destination = %self.destination, user = %self.credentials.username, "Login requested");
        let client = self.client.clone();
        let credentials = self.credentials.clone();
        let timeout = self.ack_timeout;
        tokio::spawn(async move {
            let result = login(&client, &credentials, timeout).await;
            let _ = results.send(result).await;
        });
    }

    fn login_finished(&mut self, result: Result<(), CoreError>) {
        if self.ready.is_some() {
            self.resolve(result);
            return;
        }
        match result {
            Ok(()) => tracing::info!(destination = %self.destination, "Logged in again after reconnect"),
            Err(e) => tracing::warn!(destination = %self.destination, error = %e, "Re-login failed"),
        }
    }

    fn resolve(&mut self, result: Result<(), CoreError>) {
        if let Some(ready) = self.ready.take() {
            // The establishing caller may have given up already.
            let _ = ready.send(result);
        }
    }
}

async fn until_grace(grace: &mut Option<Pin<Box<Sleep>>>) {
    match grace {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Answer a login challenge with `credentials`.
async fn login(
    client: &SocketClient,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<(), CoreError> {
    let payload = json!({
        "username": credentials.username,
        "password": credentials.password.expose_secret(),
        "token": "",
    });

    match ack::emit_with_ack(client, LOGIN, payload, timeout).await {
        Ok(_) => Ok(()),
        Err(CoreError::RemoteRejected { ack }) => Err(CoreError::Authentication {
            message: ack
                .get("msg")
                .or_else(|| ack.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("login rejected")
                .to_owned(),
        }),
        Err(CoreError::AckTimeout { timeout_ms, .. }) => Err(CoreError::transport(format!(
            "login not acknowledged within {timeout_ms}ms"
        ))),
        Err(e) => Err(e),
    }
}
