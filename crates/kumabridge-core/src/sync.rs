// ── Monitor cache synchronization ──
//
// Turns server-pushed list events into cache mutations. Pushes are
// applied one at a time in arrival order; a malformed push is logged and
// dropped without touching the cache.

use serde_json::Value;

use crate::model::{Monitor, MonitorId};
use crate::store::MonitorCache;

// ── Event names ──────────────────────────────────────────────────────

pub const MONITOR_LIST: &str = "monitorList";
pub const UPDATE_MONITOR: &str = "updateMonitorIntoList";
pub const DELETE_MONITOR: &str = "deleteMonitorFromList";

/// A decoded cache delta.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorPush {
    /// Full list; replaces the cache.
    Replace(Vec<Monitor>),
    /// Monitors to insert or update.
    Upsert(Vec<Monitor>),
    /// Monitor to remove.
    Delete(MonitorId),
}

impl MonitorPush {
    /// Decode a server event.
    ///
    /// `Ok(None)` for events that are not cache deltas; `Err` with a
    /// description for malformed deltas.
    pub fn from_event(name: &str, args: &[Value]) -> Result<Option<Self>, String> {
        let data = args.first();
        match name {
            MONITOR_LIST => {
                let entries = as_map(name, data)?;
                let monitors = entries
                    .iter()
                    .filter_map(|(key, value)| parse_entry(name, key, value))
                    .collect();
                Ok(Some(Self::Replace(monitors)))
            }
            UPDATE_MONITOR => {
                let entries = as_map(name, data)?;
                let monitors: Vec<Monitor> = entries
                    .iter()
                    .filter_map(|(key, value)| parse_entry(name, key, value))
                    .collect();
                if monitors.is_empty() {
                    return Err(format!("{name} carried no usable monitor"));
                }
                Ok(Some(Self::Upsert(monitors)))
            }
            DELETE_MONITOR => data
                .and_then(MonitorId::from_value)
                .map(|id| Some(Self::Delete(id)))
                .ok_or_else(|| format!("{name} expects a numeric or string id")),
            _ => Ok(None),
        }
    }

    /// Apply this delta to `cache`.
    pub fn apply(self, cache: &MonitorCache) {
        match self {
            Self::Replace(monitors) => {
                tracing::debug!(count = monitors.len(), "Replacing monitor list");
                cache.replace_all(monitors);
            }
            Self::Upsert(monitors) => {
                for monitor in monitors {
                    tracing::trace!(id = %monitor.id, "Upserting monitor");
                    cache.upsert(monitor);
                }
            }
            Self::Delete(id) => {
                if cache.remove(&id).is_none() {
                    tracing::debug!(%id, "Delete for a monitor that is not cached");
                }
            }
        }
    }
}

/// Decode and apply one server event. Returns `true` if the event was
/// a cache delta (applied or dropped as malformed).
pub fn apply_event(cache: &MonitorCache, name: &str, args: &[Value]) -> bool {
    match MonitorPush::from_event(name, args) {
        Ok(Some(push)) => {
            push.apply(cache);
            true
        }
        Ok(None) => false,
        Err(reason) => {
            tracing::warn!(event = name, %reason, "Ignoring malformed monitor push");
            true
        }
    }
}

fn as_map<'a>(
    name: &str,
    data: Option<&'a Value>,
) -> Result<&'a serde_json::Map<String, Value>, String> {
    data.and_then(Value::as_object)
        .ok_or_else(|| format!("{name} expects an object keyed by monitor id"))
}

fn parse_entry(event: &str, key: &str, value: &Value) -> Option<Monitor> {
    let monitor = Monitor::from_entry(value, Some(key));
    if monitor.is_none() {
        tracing::warn!(
            event,
            key,
            "Skipping monitor entry that is not an object with a usable id"
        );
    }
    monitor
}
