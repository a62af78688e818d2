use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;

/// Raw key-value storage medium.
///
/// Values cross this boundary as [`serde_json::Value`]: string-oriented
/// media (a browser-style local storage, a file) hold a `Value::String`
/// containing JSON, structured media may hold any value as-is. The backend
/// never interprets what it stores.
///
/// Implementations must satisfy these invariants:
/// - `get_item` on an absent key returns `Ok(None)`, never an error.
/// - `remove_item` on an absent key is a no-op.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the raw value stored under `key`.
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Delete the value stored under `key`.
    async fn remove_item(&self, key: &str) -> StorageResult<()>;
}
