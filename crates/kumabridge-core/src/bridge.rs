// ── Bridge façade ──
//
// The single entry point for consumers: owns the connection registry and
// the tuning settings, and exposes the request/response operations.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::ack;
use crate::config::{BridgeSettings, Credentials};
use crate::connection::{Connection, ConnectionInfo};
use crate::error::CoreError;
use crate::model::{AckPayload, Destination, GroupSummary, Monitor};
use crate::query;
use crate::registry::ConnectionRegistry;

/// Request/response façade over pooled Socket.IO connections.
///
/// Cheaply cloneable via `Arc<BridgeInner>`.
#[derive(Clone, Debug)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

#[derive(Debug)]
struct BridgeInner {
    registry: ConnectionRegistry,
}

impl Bridge {
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                registry: ConnectionRegistry::new(settings, CancellationToken::new()),
            }),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        self.inner.registry.settings()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    /// Ensure a ready connection to `destination`.
    pub async fn connect(
        &self,
        destination: &Destination,
        credentials: &Credentials,
    ) -> Result<Arc<Connection>, CoreError> {
        self.inner.registry.get_or_create(destination, credentials).await
    }

    /// Send one event and wait for its acknowledgement.
    ///
    /// `timeout` defaults to the configured ack timeout.
    pub async fn emit_with_ack(
        &self,
        destination: &Destination,
        credentials: &Credentials,
        event_name: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<AckPayload, CoreError> {
        if event_name.trim().is_empty() {
            return Err(CoreError::validation("eventName must not be empty"));
        }
        let connection = self.connect(destination, credentials).await?;
        let timeout = timeout.unwrap_or(self.settings().ack_timeout);

        tracing::debug!(%destination, event = event_name, ?timeout, "Emitting with ack");
        ack::emit_with_ack(connection.client(), event_name, payload, timeout).await
    }

    pub async fn list_monitors(
        &self,
        destination: &Destination,
        credentials: &Credentials,
    ) -> Result<Vec<Monitor>, CoreError> {
        let connection = self.connect(destination, credentials).await?;
        query::list_monitors(&connection)
    }

    pub async fn list_groups(
        &self,
        destination: &Destination,
        credentials: &Credentials,
    ) -> Result<Vec<GroupSummary>, CoreError> {
        let connection = self.connect(destination, credentials).await?;
        query::list_groups(&connection)
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.inner.registry.connections()
    }

    /// Close every upstream connection.
    pub fn shutdown(&self) {
        tracing::info!(connections = self.inner.registry.len(), "Shutting down bridge");
        self.inner.registry.shutdown();
    }
}
