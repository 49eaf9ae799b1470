// ── Established connections ──

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kumabridge_api::{ConnectionState, SocketClient};
use serde::Serialize;

use crate::model::Destination;
use crate::store::MonitorCache;

/// One live, authenticated connection and its monitor cache.
///
/// Owned by the [`ConnectionRegistry`](crate::ConnectionRegistry); the
/// transport reconnects on its own until it gives up or is shut down.
#[derive(Debug)]
pub struct Connection {
    destination: Destination,
    client: SocketClient,
    cache: Arc<MonitorCache>,
    established_at: DateTime<Utc>,
}

impl Connection {
    pub(crate) fn new(destination: Destination, client: SocketClient, cache: Arc<MonitorCache>) -> Self {
        Self {
            destination,
            client,
            cache,
            established_at: Utc::now(),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn client(&self) -> &SocketClient {
        &self.client
    }

    pub fn cache(&self) -> &MonitorCache {
        &self.cache
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// The transport has given up (or was shut down) and will not reconnect.
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Shut the transport down.
    pub fn close(&self) {
        self.client.shutdown();
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            destination: self.destination.to_string(),
            state: self.state().to_string(),
            monitors: self.cache.len(),
            established_at: self.established_at,
            last_push: self.cache.last_push(),
        }
    }
}

/// Summary of a connection for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub destination: String,
    pub state: String,
    pub monitors: usize,
    pub established_at: DateTime<Utc>,
    pub last_push: Option<DateTime<Utc>>,
}
