use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::traits::StorageBackend;

/// In-memory, HashMap-based storage backend.
///
/// Intended for tests and embedding. Values are held behind a `RwLock` and
/// cloned on read/write. The backend counts writes and removals so callers
/// can assert on persistence traffic, and can be switched to read-only to
/// simulate a failing medium.
pub struct InMemoryStorage {
    items: RwLock<HashMap<String, Value>>,
    writes: AtomicUsize,
    removals: AtomicUsize,
    read_only: AtomicBool,
}

impl InMemoryStorage {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            removals: AtomicUsize::new(0),
            read_only: AtomicBool::new(false),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.items.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.items.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of all stored keys.
    pub fn keys(&self) -> Vec<String> {
        let map = self.items.read().expect("lock poisoned");
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Peek at the raw stored value without going through the async API.
    pub fn raw(&self, key: &str) -> Option<Value> {
        self.items.read().expect("lock poisoned").get(key).cloned()
    }

    /// Seed a raw value without counting it as a write.
    pub fn insert_raw(&self, key: impl Into<String>, value: Value) {
        self.items
            .write()
            .expect("lock poisoned")
            .insert(key.into(), value);
    }

    /// Remove every stored key.
    pub fn clear(&self) {
        self.items.write().expect("lock poisoned").clear();
    }

    /// Number of successful `set_item` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of `remove_item` calls so far.
    pub fn remove_count(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }

    /// When read-only, every `set_item` and `remove_item` fails.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("storage is read-only".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.raw(key))
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        self.ensure_writable()?;
        self.items
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.ensure_writable()?;
        self.items.write().expect("lock poisoned").remove(key);
        self.removals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("key_count", &self.len())
            .field("writes", &self.write_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_and_get() {
        let storage = InMemoryStorage::new();
        storage.set_item("k", json!("v")).await.unwrap();
        assert_eq!(storage.get_item("k").await.unwrap(), Some(json!("v")));
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let storage = InMemoryStorage::new();
        assert!(storage.get_item("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_overwrites() {
        let storage = InMemoryStorage::new();
        storage.set_item("k", json!(1)).await.unwrap();
        storage.set_item("k", json!(2)).await.unwrap();
        assert_eq!(storage.raw("k"), Some(json!(2)));
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.write_count(), 2);
    }

    #[tokio::test]
    async fn remove_present_and_missing() {
        let storage = InMemoryStorage::new();
        storage.insert_raw("k", json!({"a": 1}));
        storage.remove_item("k").await.unwrap();
        assert!(storage.is_empty());
        // Removing again is a no-op.
        storage.remove_item("k").await.unwrap();
        assert_eq!(storage.remove_count(), 2);
    }

    #[tokio::test]
    async fn insert_raw_is_not_counted() {
        let storage = InMemoryStorage::new();
        storage.insert_raw("seed", json!("x"));
        assert_eq!(storage.write_count(), 0);
        assert_eq!(storage.get_item("seed").await.unwrap(), Some(json!("x")));
    }

    #[tokio::test]
    async fn read_only_rejects_writes() {
        let storage = InMemoryStorage::new();
        storage.insert_raw("k", json!(1));
        storage.set_read_only(true);

        let err = storage.set_item("k", json!(2)).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(storage.remove_item("k").await.is_err());
        // Reads still work.
        assert_eq!(storage.get_item("k").await.unwrap(), Some(json!(1)));

        storage.set_read_only(false);
        storage.set_item("k", json!(3)).await.unwrap();
        assert_eq!(storage.raw("k"), Some(json!(3)));
    }

    #[test]
    fn keys_are_sorted() {
        let storage = InMemoryStorage::new();
        storage.insert_raw("b", json!(1));
        storage.insert_raw("a", json!(1));
        storage.insert_raw("c", json!(1));
        assert_eq!(storage.keys(), vec!["a", "b", "c"]);

        storage.clear();
        assert!(storage.is_empty());
    }

    #[test]
    fn debug_format() {
        let storage = InMemoryStorage::default();
        let debug = format!("{storage:?}");
        assert!(debug.contains("InMemoryStorage"));
        assert!(debug.contains("key_count"));
    }
}
