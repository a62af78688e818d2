use std::sync::{Arc, LazyLock};

use keepsake_storage::{Snapshot, StorageBackend};
use keepsake_store::ReactiveTarget;
use keepsake_sync::{
    ConfigRegistry, PersistDefaults, PersistOptions, PersistStore, ReactionOptions,
    StorageOptions, StoreRegistry, TargetId,
};
use tracing::debug;

use crate::error::{PersistError, PersistResult};

static GLOBAL: LazyLock<Persistor> = LazyLock::new(Persistor::new);

/// Entry point for persisting stores.
///
/// Owns the defaults new engines are built from and the registry of live
/// engines. Most programs use the process-wide instance through
/// [`Persistor::global`] (or the free functions at the crate root); tests
/// build their own so they do not share state.
///
/// Control operations address a store by the `Arc` it was attached with.
/// On a store that is not attached they do nothing.
pub struct Persistor {
    config: ConfigRegistry,
    registry: Arc<StoreRegistry>,
}

impl Persistor {
    pub fn new() -> Self {
        Self::with_defaults(PersistDefaults::default())
    }

    pub fn with_defaults(defaults: PersistDefaults) -> Self {
        Self {
            config: ConfigRegistry::new(defaults),
            registry: StoreRegistry::new(),
        }
    }

    /// The process-wide instance.
    pub fn global() -> &'static Persistor {
        &GLOBAL
    }

    // ---- Configuration ----

    /// Replace the defaults used by engines attached from now on.
    pub fn configure(&self, storage: StorageOptions, reaction: ReactionOptions) {
        self.config.configure(storage, reaction);
    }

    /// Replace the defaults from a TOML document. The backend cannot be
    /// expressed in TOML and is passed separately.
    pub fn configure_from_toml(
        &self,
        source: &str,
        storage: Option<Arc<dyn StorageBackend>>,
    ) -> PersistResult<()> {
        let mut defaults = PersistDefaults::from_toml_str(source)?;
        defaults.storage.storage = storage;
        self.configure(defaults.storage, defaults.reaction);
        Ok(())
    }

    pub fn defaults(&self) -> Arc<PersistDefaults> {
        self.config.snapshot()
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    // ---- Attachment ----

    /// Persist `target`: build an engine from `options` over the current
    /// defaults, register it, hydrate the store and start persisting.
    ///
    /// An engine already attached to `target`, or already using the same
    /// storage name, is stopped first.
    pub async fn attach<T>(
        &self,
        target: &Arc<T>,
        options: PersistOptions,
        reaction: ReactionOptions,
    ) -> Arc<PersistStore>
    where
        T: ReactiveTarget + 'static,
    {
        let defaults = self.config.snapshot();
        let erased: Arc<dyn ReactiveTarget> = Arc::clone(target) as Arc<dyn ReactiveTarget>;
        let engine = Arc::new(PersistStore::new(erased, options, reaction, &defaults));

        self.registry
            .register(TargetId::of(target), Arc::clone(&engine));
        debug!(name = %engine.storage_name(), "store attached");

        engine.init().await;
        engine
    }

    /// The engine attached to `target`.
    pub fn engine<T: ?Sized>(&self, target: &Arc<T>) -> PersistResult<Arc<PersistStore>> {
        self.registry
            .get(TargetId::of(target))
            .ok_or(PersistError::NotAttached)
    }

    // ---- Control ----

    pub fn pause<T: ?Sized>(&self, target: &Arc<T>) {
        if let Ok(engine) = self.engine(target) {
            engine.pause_persisting();
        }
    }

    pub fn start<T: ?Sized>(&self, target: &Arc<T>) {
        if let Ok(engine) = self.engine(target) {
            engine.start_persisting();
        }
    }

    /// Stop and detach. The store keeps its current values.
    pub fn stop<T: ?Sized>(&self, target: &Arc<T>) {
        if let Ok(engine) = self.engine(target) {
            engine.stop_persisting();
        }
    }

    /// Remove the stored entry. Fails only if the backend does.
    pub async fn clear<T: ?Sized>(&self, target: &Arc<T>) -> PersistResult<()> {
        match self.engine(target) {
            Ok(engine) => Ok(engine.clear_persisted_store().await?),
            Err(_) => Ok(()),
        }
    }

    pub async fn hydrate<T: ?Sized>(&self, target: &Arc<T>) {
        if let Ok(engine) = self.engine(target) {
            engine.hydrate_store().await;
        }
    }

    /// What storage currently holds for `target`, without touching it.
    pub async fn get_persisted_snapshot<T: ?Sized>(&self, target: &Arc<T>) -> Option<Snapshot> {
        let engine = self.engine(target).ok()?;
        engine.get_persisted_store().await
    }

    pub fn is_hydrated<T: ?Sized>(&self, target: &Arc<T>) -> bool {
        self.engine(target).is_ok_and(|e| e.is_hydrated())
    }

    pub fn is_persisting<T: ?Sized>(&self, target: &Arc<T>) -> bool {
        self.engine(target).is_ok_and(|e| e.is_persisting())
    }
}

impl Default for Persistor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Persistor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistor")
            .field("defaults", &self.config.snapshot())
            .field("registry", &self.registry)
            .finish()
    }
}
