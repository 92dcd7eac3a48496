use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Process-wide mirror of bundle name to last observed content hash.
///
/// The CR mirror is the only writer; the directory watcher only reads.
/// A stale read costs one redundant api round trip, never correctness,
/// so plain read/write locking is all the coordination needed.
#[derive(Clone, Default)]
pub struct FingerprintStore {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.inner.read().unwrap().get(name).cloned()
    }

    pub fn set(&self, name: &str, hash: &str) {
        self.inner.write().unwrap().insert(name.into(), hash.into());
    }

    pub fn remove(&self, name: &str) {
        self.inner.write().unwrap().remove(name);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::FingerprintStore;

    #[test]
    fn set_get_remove() {
        let store = FingerprintStore::new();
        assert_eq!(store.get("hello"), None);
        store.set("hello", "aaaa");
        assert_eq!(store.get("hello").as_deref(), Some("aaaa"));
        store.set("hello", "bbbb");
        assert_eq!(store.get("hello").as_deref(), Some("bbbb"));
        store.remove("hello");
        assert_eq!(store.get("hello"), None);
    }

    #[test]
    fn clones_share_state() {
        let store = FingerprintStore::new();
        let other = store.clone();
        store.set("hello", "aaaa");
        assert_eq!(other.get("hello").as_deref(), Some("aaaa"));
        assert_eq!(other.len(), 1);
    }
}
