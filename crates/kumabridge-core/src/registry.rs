// ── Connection registry ──
//
// At most one connection per destination. Establishment is single-flight:
// concurrent first requests for a destination share one attempt.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::config::{BridgeSettings, Credentials};
use crate::connection::{Connection, ConnectionInfo};
use crate::error::CoreError;
use crate::establish::establish;
use crate::model::Destination;

type Slot = Arc<OnceCell<Arc<Connection>>>;

/// Map from destination to its established connection.
pub struct ConnectionRegistry {
    slots: DashMap<Destination, Slot>,
    settings: BridgeSettings,
    cancel: CancellationToken,
}

impl ConnectionRegistry {
    pub fn new(settings: BridgeSettings, cancel: CancellationToken) -> Self {
        Self {
            slots: DashMap::new(),
            settings,
            cancel,
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Return the connection for `destination`, establishing it first if
    /// there is none.
    ///
    /// `credentials` are only used when a connection has to be
    /// established. When an attempt fails its empty slot is dropped, and a caller
    /// that was waiting on it runs its own attempt with its own
    /// credentials. A connection whose transport has given up is evicted
    /// and replaced.
    pub async fn get_or_create(
        &self,
        destination: &Destination,
        credentials: &Credentials,
    ) -> Result<Arc<Connection>, CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::TransportUnavailable);
        }

        loop {
            // Clone the slot out so no map guard is held across the await.
            let slot = Arc::clone(&self.slots.entry(destination.clone()).or_default());

            let result = slot
                .get_or_try_init(|| {
                    establish(destination, credentials, &self.settings, self.cancel.child_token())
                })
                .await;
            let connection = match result {
                Ok(connection) => connection,
                Err(err) => {
                    // Only the last holder drops the slot: the map and this
                    // clone. Other waiters still retry through it.
                    self.slots.remove_if(destination, |_, current| {
                        Arc::ptr_eq(current, &slot)
                            && Arc::strong_count(current) == 2
                            && !current.initialized()
                    });
                    return Err(err);
                }
            };

            if !connection.is_closed() {
                return Ok(Arc::clone(connection));
            }

            tracing::info!(%destination, "Evicting closed connection");
            self.slots
                .remove_if(destination, |_, current| Arc::ptr_eq(current, &slot));
        }
    }

    /// The established connection for `destination`, if any.
    pub fn get(&self, destination: &Destination) -> Option<Arc<Connection>> {
        self.slots
            .get(destination)
            .and_then(|slot| slot.value().get().cloned())
    }

    /// Summaries of every established connection.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.slots
            .iter()
            .filter_map(|slot| slot.value().get().map(|c| c.info()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every connection and refuse new ones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        for slot in &self.slots {
            if let Some(connection) = slot.value().get() {
                tracing::debug!(destination = %connection.destination(), "Closing connection");
                connection.close();
            }
        }
        self.slots.clear();
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .finish_non_exhaustive()
    }
}
