use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::traits::StorageBackend;

const EXTENSION: &str = "json";

/// Distinguishes temp files of overlapping writes within this process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Directory-backed storage: one file per key.
///
/// The medium is string-oriented. A `Value::String` is written verbatim;
/// any other value is written as its JSON text. Reads always return a
/// `Value::String` holding the file contents.
///
/// Layout:
/// ```text
/// <root>/<key>.json
/// ```
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves either the old or the new contents. Every write
/// gets its own temp file; concurrent writes to one key all succeed and the
/// last rename wins.
#[derive(Clone, Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "file storage opened");
        Ok(Self { root })
    }

    /// The directory holding the stored files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sorted list of stored keys.
    pub async fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.starts_with('.')
            && !key.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.{EXTENSION}")))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(Value::String(contents))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let contents = match value {
            Value::String(s) => s,
            other => serde_json::to_string(&other)?,
        };
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .root
            .join(format!(".{key}.{EXTENSION}.{}.{seq}.tmp", std::process::id()));
        let written = match tokio::fs::write(&tmp, contents.as_bytes()).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(key, bytes = contents.len(), "file storage write");
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn open_temp() -> (tempfile::TempDir, FileStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("store")).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let (dir, storage) = open_temp().await;
        assert!(storage.root().is_dir());
        assert!(storage.root().starts_with(dir.path()));
    }

    #[tokio::test]
    async fn string_values_are_written_verbatim() {
        let (_dir, storage) = open_temp().await;
        storage.set_item("todo", json!(r#"{"a":1}"#)).await.unwrap();

        let on_disk = std::fs::read_to_string(storage.root().join("todo.json")).unwrap();
        assert_eq!(on_disk, r#"{"a":1}"#);
        assert_eq!(
            storage.get_item("todo").await.unwrap(),
            Some(json!(r#"{"a":1}"#))
        );
    }

    #[tokio::test]
    async fn structured_values_come_back_as_json_text() {
        let (_dir, storage) = open_temp().await;
        storage.set_item("todo", json!({"a": [1, 2]})).await.unwrap();

        let raw = storage.get_item("todo").await.unwrap().unwrap();
        let text = raw.as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, json!({"a": [1, 2]}));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let (_dir, storage) = open_temp().await;
        assert!(storage.get_item("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (_dir, storage) = open_temp().await;
        storage.set_item("k", json!("1")).await.unwrap();
        storage.remove_item("k").await.unwrap();
        storage.remove_item("k").await.unwrap();
        assert!(storage.get_item("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_lists_sorted_and_skips_temp_files() {
        let (_dir, storage) = open_temp().await;
        storage.set_item("beta", json!("1")).await.unwrap();
        storage.set_item("alpha", json!("1")).await.unwrap();
        std::fs::write(storage.root().join("notes.txt"), "ignored").unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["alpha", "beta"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_one_key_all_succeed() {
        let (_dir, storage) = open_temp().await;
        let storage = std::sync::Arc::new(storage);

        let writers: Vec<_> = (0..64)
            .map(|i| {
                let storage = storage.clone();
                tokio::spawn(async move { storage.set_item("k", json!(format!("{i}"))).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let raw = storage.get_item("k").await.unwrap().unwrap();
        let n: u32 = raw.as_str().unwrap().parse().unwrap();
        assert!(n < 64);
        assert_eq!(storage.keys().await.unwrap(), vec!["k"]);
        let leftovers = std::fs::read_dir(storage.root()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let (_dir, storage) = open_temp().await;
        for key in ["", "..", "a/b", "a\\b", ".hidden"] {
            let err = storage.set_item(key, json!("x")).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "key {key:?}");
        }
    }
}
