// ── Monitor entities ──
//
// Monitors are the remote entities pushed by the server. Only `id` is
// typed; `name` and the kind are read through accessors, and every
// attribute other than the id is carried through untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind value that marks a monitor as a group.
pub const GROUP_KIND: &str = "group";

// ── MonitorId ───────────────────────────────────────────────────────

/// Identifier of a monitor as it appears on the wire.
///
/// Servers send numeric ids, but map keys in list pushes are strings,
/// so both forms are accepted. Cache keys use [`MonitorId::key`], which
/// makes `1` and `"1"` the same monitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonitorId {
    Number(i64),
    Text(String),
}

impl MonitorId {
    /// Normalized cache key.
    pub fn key(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_owned(),
        }
    }

    /// Interpret a JSON value as an id. Numbers and strings only.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::String(s) => Some(Self::from(s.as_str())),
            _ => None,
        }
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s.trim()),
        }
    }
}

impl From<i64> for MonitorId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for MonitorId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

// ── Monitor ─────────────────────────────────────────────────────────

/// A remote monitor as held in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,

    /// Every other attribute, passed through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Monitor {
    /// Parse one entry of a list push.
    ///
    /// An entry whose `id` is missing or not a number or string takes
    /// `fallback_id` (its key in the enclosing map). Returns `None` for
    /// anything that is not an object or has no usable id.
    pub fn from_entry(value: &Value, fallback_id: Option<&str>) -> Option<Self> {
        let mut extra = value.as_object()?.clone();
        let id = extra
            .remove("id")
            .as_ref()
            .and_then(MonitorId::from_value)
            .or_else(|| fallback_id.map(MonitorId::from))?;
        Some(Self { id, extra })
    }

    /// Display name, when the server sent one as a string.
    pub fn name(&self) -> Option<&str> {
        self.extra.get("name").and_then(Value::as_str)
    }

    /// Monitor type (`type` on the wire, `kind` also accepted).
    pub fn kind(&self) -> Option<&str> {
        self.extra
            .get("type")
            .or_else(|| self.extra.get("kind"))
            .and_then(Value::as_str)
    }

    pub fn is_group(&self) -> bool {
        self.kind() == Some(GROUP_KIND)
    }

    pub fn key(&self) -> String {
        self.id.key()
    }
}

// ── GroupSummary ────────────────────────────────────────────────────

/// Projection of a group monitor: exactly `id` and `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: MonitorId,
    pub name: Option<String>,
}

impl From<&Monitor> for GroupSummary {
    fn from(monitor: &Monitor) -> Self {
        Self {
            id: monitor.id.clone(),
            name: monitor.name().map(str::to_owned),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn numeric_and_string_ids_share_a_key() {
        assert_eq!(MonitorId::from(1).key(), MonitorId::from("1").key());
        assert_eq!(
            MonitorId::from_value(&json!(" 7 ")).unwrap().key(),
            "7".to_owned()
        );
        assert!(MonitorId::from_value(&json!(true)).is_none());
    }

    #[test]
    fn display_matches_cache_key() {
        let id = MonitorId::from(" 7 ");
        assert_eq!(id.to_string(), id.key());
        assert_eq!(MonitorId::from(7).to_string(), "7");
    }

    #[test]
    fn entry_keeps_unknown_attributes() {
        let monitor = Monitor::from_entry(
            &json!({"id": 3, "name": "web", "type": "http", "url": "https://x", "active": true}),
            None,
        )
        .unwrap();

        assert_eq!(monitor.id, MonitorId::Number(3));
        assert_eq!(monitor.kind(), Some("http"));
        assert_eq!(
            serde_json::to_value(&monitor).unwrap(),
            json!({"id": 3, "name": "web", "type": "http", "url": "https://x", "active": true})
        );
    }

    #[test]
    fn entry_without_id_takes_map_key() {
        let monitor = Monitor::from_entry(&json!({"name": "db"}), Some("12")).unwrap();
        assert_eq!(monitor.id, MonitorId::Text("12".into()));
        assert_eq!(monitor.key(), "12");
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(Monitor::from_entry(&json!("nope"), Some("1")).is_none());
        assert!(Monitor::from_entry(&json!({"name": "x"}), None).is_none());
    }

    #[test]
    fn non_string_name_is_passed_through() {
        let monitor =
            Monitor::from_entry(&json!({"id": 1, "name": 42, "type": "http"}), None).unwrap();

        assert_eq!(monitor.name(), None);
        assert_eq!(monitor.kind(), Some("http"));
        assert_eq!(
            serde_json::to_value(&monitor).unwrap(),
            json!({"id": 1, "name": 42, "type": "http"})
        );
    }

    #[test]
    fn unusable_id_falls_back_to_map_key() {
        let monitor = Monitor::from_entry(&json!({"id": null, "name": "db"}), Some("4")).unwrap();
        assert_eq!(monitor.key(), "4");
        assert_eq!(monitor.name(), Some("db"));
    }

    #[test]
    fn kind_falls_back_to_kind_field() {
        let monitor = Monitor::from_entry(&json!({"id": 1, "kind": "group"}), None).unwrap();
        assert!(monitor.is_group());
        assert_eq!(
            GroupSummary::from(&monitor),
            GroupSummary {
                id: MonitorId::Number(1),
                name: None,
            }
        );
    }
}
