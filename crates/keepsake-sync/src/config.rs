//! Persistence options and the process-wide defaults they are merged over.
//!
//! Every option is optional at the point it is declared. An engine resolves
//! its options exactly once, at construction, field by field:
//!
//! ```text
//! per-engine value  >  global default  >  built-in default
//! ```
//!
//! so an engine that sets only `expire_in` still inherits the global
//! storage backend. Replacing the global defaults later has no effect on
//! engines that already exist.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use keepsake_storage::{AdapterOptions, Clock, StorageBackend};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// What clearing a persisted store does to the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearMode {
    /// Delete the entry.
    #[default]
    Remove,
    /// Overwrite the entry with an empty object.
    WriteEmpty,
}

/// Storage-related options. `None` means "inherit".
#[derive(Clone, Default)]
pub struct StorageOptions {
    pub expire_in: Option<i64>,
    pub remove_on_expiration: Option<bool>,
    pub stringify: Option<bool>,
    pub version: Option<u32>,
    pub debug_mode: Option<bool>,
    pub clear_mode: Option<ClearMode>,
    pub storage: Option<Arc<dyn StorageBackend>>,
}

impl StorageOptions {
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_expire_in(mut self, millis: i64) -> Self {
        self.expire_in = Some(millis);
        self
    }

    pub fn with_remove_on_expiration(mut self, remove: bool) -> Self {
        self.remove_on_expiration = Some(remove);
        self
    }

    pub fn with_stringify(mut self, stringify: bool) -> Self {
        self.stringify = Some(stringify);
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = Some(debug_mode);
        self
    }

    pub fn with_clear_mode(mut self, mode: ClearMode) -> Self {
        self.clear_mode = Some(mode);
        self
    }

    /// Field-by-field merge: values set on `self` win over `defaults`.
    pub fn merged_over(&self, defaults: &StorageOptions) -> StorageOptions {
        StorageOptions {
            expire_in: self.expire_in.or(defaults.expire_in),
            remove_on_expiration: self.remove_on_expiration.or(defaults.remove_on_expiration),
            stringify: self.stringify.or(defaults.stringify),
            version: self.version.or(defaults.version),
            debug_mode: self.debug_mode.or(defaults.debug_mode),
            clear_mode: self.clear_mode.or(defaults.clear_mode),
            storage: self.storage.clone().or_else(|| defaults.storage.clone()),
        }
    }

    /// Fill remaining gaps with built-in defaults.
    pub fn to_adapter_options(&self) -> AdapterOptions {
        let builtin = AdapterOptions::default();
        AdapterOptions {
            expire_in: self.expire_in,
            remove_on_expiration: self
                .remove_on_expiration
                .unwrap_or(builtin.remove_on_expiration),
            stringify: self.stringify.unwrap_or(builtin.stringify),
            version: self.version,
            debug_mode: self.debug_mode.unwrap_or(builtin.debug_mode),
            storage: self.storage.clone(),
        }
    }
}

impl std::fmt::Debug for StorageOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageOptions")
            .field("expire_in", &self.expire_in)
            .field("remove_on_expiration", &self.remove_on_expiration)
            .field("stringify", &self.stringify)
            .field("version", &self.version)
            .field("debug_mode", &self.debug_mode)
            .field("clear_mode", &self.clear_mode)
            .field("storage", &self.storage.is_some())
            .finish()
    }
}

/// Timing of the change subscription. `None` means "inherit".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReactionOptions {
    /// Debounce window between a change and its write.
    pub delay: Option<Duration>,
    /// Write the current state as soon as the subscription starts.
    pub fire_immediately: Option<bool>,
}

impl ReactionOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_fire_immediately(mut self, fire: bool) -> Self {
        self.fire_immediately = Some(fire);
        self
    }

    pub fn merged_over(&self, defaults: &ReactionOptions) -> ReactionOptions {
        ReactionOptions {
            delay: self.delay.or(defaults.delay),
            fire_immediately: self.fire_immediately.or(defaults.fire_immediately),
        }
    }

    pub fn resolve(&self) -> ResolvedReaction {
        ResolvedReaction {
            delay: self.delay.filter(|d| !d.is_zero()),
            fire_immediately: self.fire_immediately.unwrap_or(true),
        }
    }
}

/// Reaction timing after all defaults are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedReaction {
    pub delay: Option<Duration>,
    pub fire_immediately: bool,
}

/// Per-engine options: the storage name, the watched properties and the
/// storage overrides.
#[derive(Clone)]
pub struct PersistOptions {
    pub name: String,
    pub properties: Vec<crate::property::PropertySpec>,
    pub storage: StorageOptions,
    /// Time source for expiration. Defaults to the system clock.
    pub clock: Option<Arc<dyn Clock>>,
}

impl PersistOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            storage: StorageOptions::default(),
            clock: None,
        }
    }

    pub fn property(mut self, property: impl Into<crate::property::PropertySpec>) -> Self {
        self.properties.push(property.into());
        self
    }

    pub fn properties<I, P>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<crate::property::PropertySpec>,
    {
        self.properties.extend(properties.into_iter().map(Into::into));
        self
    }

    pub fn storage_options(mut self, storage: StorageOptions) -> Self {
        self.storage = storage;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl std::fmt::Debug for PersistOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistOptions")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("storage", &self.storage)
            .field("clock", &self.clock.is_some())
            .finish()
    }
}

/// Process-wide defaults: storage options and reaction timing.
#[derive(Clone, Debug, Default)]
pub struct PersistDefaults {
    pub storage: StorageOptions,
    pub reaction: ReactionOptions,
}

/// TOML form of [`PersistDefaults`]. The backend cannot be described in a
/// file and is supplied in code.
///
/// ```toml
/// expire_in = 604800000
/// remove_on_expiration = false
/// stringify = true
/// version = 2
/// debug_mode = false
/// clear_mode = "write_empty"
/// delay_ms = 200
/// fire_immediately = false
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsFile {
    pub expire_in: Option<i64>,
    pub remove_on_expiration: Option<bool>,
    pub stringify: Option<bool>,
    pub version: Option<u32>,
    pub debug_mode: Option<bool>,
    pub clear_mode: Option<ClearMode>,
    pub delay_ms: Option<u64>,
    pub fire_immediately: Option<bool>,
}

impl PersistDefaults {
    /// Parse defaults from a TOML document.
    pub fn from_toml_str(source: &str) -> SyncResult<Self> {
        let file: DefaultsFile =
            toml::from_str(source).map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        Ok(file.into())
    }

    pub fn with_storage_backend(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage.storage = Some(storage);
        self
    }
}

impl From<DefaultsFile> for PersistDefaults {
    fn from(file: DefaultsFile) -> Self {
        Self {
            storage: StorageOptions {
                expire_in: file.expire_in,
                remove_on_expiration: file.remove_on_expiration,
                stringify: file.stringify,
                version: file.version,
                debug_mode: file.debug_mode,
                clear_mode: file.clear_mode,
                storage: None,
            },
            reaction: ReactionOptions {
                delay: file.delay_ms.map(Duration::from_millis),
                fire_immediately: file.fire_immediately,
            },
        }
    }
}

/// Holder of the current process-wide defaults.
///
/// Set once at startup and read thereafter. Engines copy what they need at
/// construction, so a later [`ConfigRegistry::configure`] only affects
/// engines created after it.
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    current: RwLock<Arc<PersistDefaults>>,
}

impl ConfigRegistry {
    pub fn new(defaults: PersistDefaults) -> Self {
        Self {
            current: RwLock::new(Arc::new(defaults)),
        }
    }

    /// Replace the defaults wholesale.
    pub fn configure(&self, storage: StorageOptions, reaction: ReactionOptions) {
        *self.current.write().expect("config lock poisoned") =
            Arc::new(PersistDefaults { storage, reaction });
    }

    /// The defaults in effect right now.
    pub fn snapshot(&self) -> Arc<PersistDefaults> {
        Arc::clone(&self.current.read().expect("config lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_storage::InMemoryStorage;

    fn backend() -> Arc<dyn StorageBackend> {
        Arc::new(InMemoryStorage::new())
    }

    #[test]
    fn builtin_defaults() {
        let options = StorageOptions::default().to_adapter_options();
        assert!(options.remove_on_expiration);
        assert!(options.stringify);
        assert!(!options.debug_mode);
        assert!(options.expire_in.is_none());
        assert!(options.storage.is_none());

        let reaction = ReactionOptions::default().resolve();
        assert_eq!(reaction.delay, None);
        assert!(reaction.fire_immediately);
    }

    #[test]
    fn per_engine_values_win_field_by_field() {
        let storage = backend();
        let defaults = StorageOptions::default()
            .with_storage(Arc::clone(&storage))
            .with_expire_in(1_000)
            .with_stringify(false);
        let engine = StorageOptions::default().with_expire_in(5);

        let merged = engine.merged_over(&defaults);
        assert_eq!(merged.expire_in, Some(5));
        assert_eq!(merged.stringify, Some(false));
        assert!(Arc::ptr_eq(merged.storage.as_ref().unwrap(), &storage));
    }

    #[test]
    fn per_engine_storage_overrides_global() {
        let global = backend();
        let local = backend();
        let merged = StorageOptions::default()
            .with_storage(Arc::clone(&local))
            .merged_over(&StorageOptions::default().with_storage(global));
        assert!(Arc::ptr_eq(merged.storage.as_ref().unwrap(), &local));
    }

    #[test]
    fn reaction_merge() {
        let defaults = ReactionOptions::default().with_delay(Duration::from_millis(200));
        let engine = ReactionOptions::default().with_fire_immediately(false);
        let resolved = engine.merged_over(&defaults).resolve();
        assert_eq!(resolved.delay, Some(Duration::from_millis(200)));
        assert!(!resolved.fire_immediately);
    }

    #[test]
    fn zero_delay_means_no_debounce() {
        let resolved = ReactionOptions::default()
            .with_delay(Duration::ZERO)
            .resolve();
        assert_eq!(resolved.delay, None);
    }

    #[test]
    fn defaults_from_toml() {
        let defaults = PersistDefaults::from_toml_str(
            r#"
            expire_in = 604800000
            remove_on_expiration = false
            stringify = false
            version = 2
            clear_mode = "write_empty"
            delay_ms = 200
            fire_immediately = false
            "#,
        )
        .unwrap();
        assert_eq!(defaults.storage.expire_in, Some(604_800_000));
        assert_eq!(defaults.storage.remove_on_expiration, Some(false));
        assert_eq!(defaults.storage.stringify, Some(false));
        assert_eq!(defaults.storage.version, Some(2));
        assert_eq!(defaults.storage.clear_mode, Some(ClearMode::WriteEmpty));
        assert!(defaults.storage.storage.is_none());
        assert_eq!(defaults.reaction.delay, Some(Duration::from_millis(200)));
        assert_eq!(defaults.reaction.fire_immediately, Some(false));
    }

    #[test]
    fn empty_toml_is_all_inherit() {
        let defaults = PersistDefaults::from_toml_str("").unwrap();
        assert!(defaults.storage.expire_in.is_none());
        assert_eq!(defaults.reaction, ReactionOptions::default());
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        let err = PersistDefaults::from_toml_str("jsonify = true").unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn configure_replaces_snapshot() {
        let registry = ConfigRegistry::default();
        let before = registry.snapshot();
        assert!(before.storage.storage.is_none());

        registry.configure(
            StorageOptions::default().with_storage(backend()).with_version(3),
            ReactionOptions::default().with_fire_immediately(false),
        );
        let after = registry.snapshot();
        assert_eq!(after.storage.version, Some(3));
        assert!(after.storage.storage.is_some());
        assert_eq!(after.reaction.fire_immediately, Some(false));
        // Earlier snapshots are unaffected.
        assert!(before.storage.version.is_none());
    }

    #[test]
    fn persist_options_builder() {
        let options = PersistOptions::new("todo")
            .property("list")
            .properties(["a", "b"])
            .storage_options(StorageOptions::default().with_version(1));
        assert_eq!(options.name, "todo");
        assert_eq!(options.properties.len(), 3);
        assert_eq!(options.storage.version, Some(1));
    }
}
