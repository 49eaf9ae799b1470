// ── Generic entity collection ──
//
// Concurrent keyed storage with a versioned snapshot held in `watch`
// channels.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A concurrent collection for a single entity type.
///
/// Uses `DashMap` for O(1) concurrent lookups. Every mutation bumps a
/// version counter and rebuilds the snapshot that readers clone.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    /// Primary storage: normalized key -> entity.
    by_key: DashMap<String, Arc<T>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or update an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(entity)).is_none();
        self.publish();
        is_new
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    /// Replace the whole collection with `entries`.
    ///
    /// Later entries win when two share a key. The version moves once.
    pub(crate) fn replace_all(&self, entries: impl IntoIterator<Item = (String, T)>) {
        self.by_key.clear();
        for (key, entity) in entries {
            self.by_key.insert(key, Arc::new(entity));
        }
        self.publish();
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        let values: Vec<Arc<T>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_returns_true_for_new_key() {
        let col: EntityCollection<String> = EntityCollection::new();
        assert!(col.upsert("1".into(), "hello".into()));
        assert!(!col.upsert("1".into(), "world".into()));
        assert_eq!(*col.get("1").unwrap(), "world");
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn remove_missing_key_is_a_no_op() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert("1".into(), "x".into());
        let before = col.version();

        assert!(col.remove("2").is_none());
        assert_eq!(col.version(), before);

        assert_eq!(*col.remove("1").unwrap(), "x");
        assert!(col.is_empty());
        assert!(col.version() > before);
    }

    #[test]
    fn replace_all_drops_previous_entries() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert("old".into(), "gone".into());

        col.replace_all([("a".to_owned(), "x".to_owned()), ("b".to_owned(), "y".to_owned())]);

        assert!(col.get("old").is_none());
        assert_eq!(col.snapshot().len(), 2);
    }
}
