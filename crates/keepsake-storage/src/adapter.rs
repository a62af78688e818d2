use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::envelope::{self, EnvelopeMeta, Snapshot};
use crate::error::StorageResult;
use crate::traits::StorageBackend;

/// Fully resolved options for a [`StorageAdapter`].
#[derive(Clone)]
pub struct AdapterOptions {
    /// Milliseconds until a written entry expires. May be negative.
    pub expire_in: Option<i64>,
    /// Purge expired entries when they are read.
    pub remove_on_expiration: bool,
    /// Hand the backend a JSON string instead of a structured value.
    pub stringify: bool,
    /// Version tag; entries written under another version are discarded.
    pub version: Option<u32>,
    /// Emit a diagnostic for every storage operation.
    pub debug_mode: bool,
    /// The raw medium. `None` puts the adapter in no-op mode.
    pub storage: Option<Arc<dyn StorageBackend>>,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            expire_in: None,
            remove_on_expiration: true,
            stringify: true,
            version: None,
            debug_mode: false,
            storage: None,
        }
    }
}

impl std::fmt::Debug for AdapterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterOptions")
            .field("expire_in", &self.expire_in)
            .field("remove_on_expiration", &self.remove_on_expiration)
            .field("stringify", &self.stringify)
            .field("version", &self.version)
            .field("debug_mode", &self.debug_mode)
            .field("storage", &self.storage.is_some())
            .finish()
    }
}

/// Wraps a raw [`StorageBackend`] with serialization, expiration and
/// version tagging.
///
/// Reads never fail: malformed, expired or version-mismatched entries come
/// back as an empty snapshot (and the latter two are purged). Writes and
/// removals propagate the backend's error.
pub struct StorageAdapter {
    options: AdapterOptions,
    clock: Arc<dyn Clock>,
}

impl StorageAdapter {
    /// Create an adapter reading time from the system clock.
    pub fn new(options: AdapterOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Create an adapter with an explicit time source.
    pub fn with_clock(options: AdapterOptions, clock: Arc<dyn Clock>) -> Self {
        Self { options, clock }
    }

    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Whether a backend is configured. Without one every write is a no-op.
    pub fn has_storage(&self) -> bool {
        self.options.storage.is_some()
    }

    /// Serialize `data` into an envelope and write it under `key`.
    pub async fn set_item(&self, key: &str, data: Snapshot) -> StorageResult<()> {
        let Some(storage) = &self.options.storage else {
            return Ok(());
        };

        let meta = EnvelopeMeta::for_write(
            self.clock.now_millis(),
            self.options.expire_in,
            self.options.version,
        );
        let sealed = envelope::seal(data, meta);
        let payload = if self.options.stringify {
            Value::String(serde_json::to_string(&sealed)?)
        } else {
            sealed
        };

        if self.options.debug_mode {
            debug!(key, payload = %payload, "storage setItem");
        }

        storage.set_item(key, payload).await
    }

    /// Read and validate the snapshot stored under `key`.
    pub async fn get_item(&self, key: &str) -> Snapshot {
        let Some(storage) = &self.options.storage else {
            return Snapshot::new();
        };

        let raw = match storage.get_item(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Snapshot::new(),
            Err(e) => {
                warn!(key, error = %e, "storage read failed; treating entry as absent");
                return Snapshot::new();
            }
        };

        let parsed = match raw {
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => value,
                Err(_) => Value::String(text),
            },
            structured => structured,
        };
        let (data, meta) = envelope::open(parsed);

        let now = self.clock.now_millis();
        let expired = meta.is_expired(now);
        let mismatched = meta.is_version_mismatch(self.options.version);

        if self.options.debug_mode {
            debug!(key, expired, mismatched, fields = data.len(), "storage getItem");
        }

        if (expired && self.options.remove_on_expiration) || mismatched {
            if let Err(e) = self.remove_item(key).await {
                warn!(key, error = %e, "failed to purge stale entry");
            }
            return Snapshot::new();
        }

        data
    }

    /// Delete the entry stored under `key`.
    pub async fn remove_item(&self, key: &str) -> StorageResult<()> {
        let Some(storage) = &self.options.storage else {
            return Ok(());
        };
        if self.options.debug_mode {
            debug!(key, "storage removeItem");
        }
        storage.remove_item(key).await
    }
}

impl std::fmt::Debug for StorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapter")
            .field("options", &self.options)
            .finish()
    }
}
