use std::collections::HashMap;
use std::sync::RwLock;

use dpk_types::Key;

use crate::delta::Delta;
use crate::error::{StoreError, StoreResult};
use crate::traits::DataStore;

/// In-memory, HashMap-based delta store.
///
/// Intended for tests and embedding. Entries live behind a `RwLock` and are
/// cloned on read. Inserting is allowed at any time, which makes this store
/// handy for simulating packs that appear while a union is running.
pub struct InMemoryDataStore {
    name: String,
    deltas: RwLock<HashMap<Key, Delta>>,
}

impl InMemoryDataStore {
    /// Create a new empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deltas: RwLock::new(HashMap::new()),
        }
    }

    /// Build a store pre-populated with `deltas`.
    pub fn with_deltas(name: impl Into<String>, deltas: impl IntoIterator<Item = Delta>) -> Self {
        let store = Self::new(name);
        for delta in deltas {
            store.insert(delta);
        }
        store
    }

    /// Insert (or replace) the delta for `delta.key`.
    pub fn insert(&self, delta: Delta) {
        self.deltas
            .write()
            .expect("lock poisoned")
            .insert(delta.key.clone(), delta);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.deltas.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.deltas.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of every key in the store.
    pub fn keys(&self) -> Vec<Key> {
        let map = self.deltas.read().expect("lock poisoned");
        let mut keys: Vec<Key> = map.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl DataStore for InMemoryDataStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self, key: &Key) -> StoreResult<bool> {
        let map = self.deltas.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }

    fn get_delta(&self, key: &Key) -> StoreResult<Delta> {
        let map = self.deltas.read().expect("lock poisoned");
        map.get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn get_delta_chain_base(&self, key: &Key) -> StoreResult<Option<Key>> {
        let map = self.deltas.read().expect("lock poisoned");
        map.get(key)
            .map(|delta| delta.base.clone())
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }
}

impl std::fmt::Debug for InMemoryDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDataStore")
            .field("name", &self.name)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaMetadata;
    use dpk_types::Node;

    fn key(path: &str, content: &[u8]) -> Key {
        Key::new(path, Node::for_content(content))
    }

    #[test]
    fn insert_and_get() {
        let store = InMemoryDataStore::new("mem");
        let k = key("a.txt", b"v1");
        store.insert(Delta::full(k.clone(), b"v1".to_vec()));

        assert!(store.exists(&k).unwrap());
        let delta = store.get_delta(&k).unwrap();
        assert_eq!(delta.data, b"v1");
        assert!(delta.is_full_snapshot());
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = InMemoryDataStore::new("mem");
        let k = key("a.txt", b"v1");
        assert!(!store.exists(&k).unwrap());
        assert!(store.get_delta(&k).unwrap_err().is_not_found());
        assert!(store.get_delta_chain_base(&k).unwrap_err().is_not_found());
    }

    #[test]
    fn chain_base_reports_base() {
        let k1 = key("a.txt", b"v1");
        let k2 = key("a.txt", b"v2");
        let store = InMemoryDataStore::with_deltas(
            "mem",
            [
                Delta::full(k1.clone(), b"v1".to_vec()),
                Delta::against(k2.clone(), k1.clone(), vec![]),
            ],
        );
        assert_eq!(store.get_delta_chain_base(&k1).unwrap(), None);
        assert_eq!(store.get_delta_chain_base(&k2).unwrap(), Some(k1));
    }

    #[test]
    fn metadata_default_reads_delta() {
        let k = key("a.txt", b"v1");
        let store = InMemoryDataStore::with_deltas(
            "mem",
            [Delta::full(k.clone(), b"v1".to_vec()).with_metadata(DeltaMetadata {
                size: Some(2),
                flags: 4,
            })],
        );
        let meta = store.get_metadata(&k).unwrap();
        assert_eq!(meta.flags, 4);
        assert_eq!(meta.size, Some(2));
    }

    #[test]
    fn same_node_different_path_is_distinct() {
        let node = Node::for_content(b"shared");
        let store = InMemoryDataStore::with_deltas(
            "mem",
            [Delta::full(Key::new("a", node), b"a".to_vec())],
        );
        assert!(store.exists(&Key::new("a", node)).unwrap());
        assert!(!store.exists(&Key::new("b", node)).unwrap());
    }

    #[test]
    fn keys_are_sorted() {
        let store = InMemoryDataStore::new("mem");
        for i in 0..5u8 {
            store.insert(Delta::full(key("f", &[i]), vec![i]));
        }
        let keys = store.keys();
        assert_eq!(keys.len(), 5);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.len(), 5);
        assert!(!store.is_empty());
    }
}
