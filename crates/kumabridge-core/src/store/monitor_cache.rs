// ── Per-connection monitor cache ──
//
// Holds the monitors the server has pushed on one connection. Written
// only by that connection's event pump; read by queries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::EntityCollection;
use crate::model::{GroupSummary, Monitor, MonitorId};

/// Cached monitors for one connection, keyed by normalized monitor id.
pub struct MonitorCache {
    monitors: EntityCollection<Monitor>,
    last_push: watch::Sender<Option<DateTime<Utc>>>,
}

impl MonitorCache {
    pub fn new() -> Self {
        let (last_push, _) = watch::channel(None);
        Self {
            monitors: EntityCollection::new(),
            last_push,
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Replace every cached monitor.
    pub fn replace_all(&self, monitors: Vec<Monitor>) {
        self.monitors
            .replace_all(monitors.into_iter().map(|m| (m.key(), m)));
        self.touch();
    }

    /// Insert or update one monitor. Returns `true` if it was new.
    pub fn upsert(&self, monitor: Monitor) -> bool {
        let is_new = self.monitors.upsert(monitor.key(), monitor);
        self.touch();
        is_new
    }

    /// Remove a monitor. Absent ids are not an error.
    pub fn remove(&self, id: &MonitorId) -> Option<Arc<Monitor>> {
        let removed = self.monitors.remove(&id.key());
        self.touch();
        removed
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, id: &MonitorId) -> Option<Arc<Monitor>> {
        self.monitors.get(&id.key())
    }

    /// All cached monitors, in no particular order.
    pub fn monitors(&self) -> Vec<Monitor> {
        self.monitors
            .snapshot()
            .iter()
            .map(|m| m.as_ref().clone())
            .collect()
    }

    /// Group monitors projected to `id` and `name`.
    pub fn groups(&self) -> Vec<GroupSummary> {
        self.monitors
            .snapshot()
            .iter()
            .filter(|m| m.is_group())
            .map(|m| GroupSummary::from(m.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Number of mutations applied so far.
    pub fn version(&self) -> u64 {
        self.monitors.version()
    }

    /// When the server last pushed a monitor change.
    pub fn last_push(&self) -> Option<DateTime<Utc>> {
        *self.last_push.borrow()
    }

    fn touch(&self) {
        self.last_push.send_replace(Some(Utc::now()));
    }
}

impl Default for MonitorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MonitorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorCache")
            .field("len", &self.len())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
