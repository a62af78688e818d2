use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::engine::PersistStore;

/// Identity of a live store: the address of its shared allocation.
///
/// Two `Arc`s (of any pointee type) to the same store have the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetId(usize);

impl TargetId {
    pub fn of<T: ?Sized>(target: &Arc<T>) -> Self {
        Self(Arc::as_ptr(target) as *const () as usize)
    }
}

/// Lookup from live store to the engine persisting it.
///
/// At most one engine per store and one engine per storage name is live:
/// registering a new engine stops whichever engines it would otherwise race
/// with. Stopped engines remove themselves.
#[derive(Default)]
pub struct StoreRegistry {
    entries: Mutex<HashMap<TargetId, Arc<PersistStore>>>,
}

impl StoreRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `engine` for `target`, disposing any engine it replaces.
    pub fn register(self: &Arc<Self>, target: TargetId, engine: Arc<PersistStore>) {
        let displaced: Vec<Arc<PersistStore>> = self
            .lock()
            .iter()
            .filter(|(id, prior)| **id == target || prior.storage_name() == engine.storage_name())
            .map(|(_, prior)| Arc::clone(prior))
            .collect();

        for prior in displaced {
            if prior.storage_name() == engine.storage_name() && cfg!(debug_assertions) {
                warn!(
                    name = %engine.storage_name(),
                    "storage name already in use; stopping the previous engine"
                );
            }
            prior.stop_persisting();
        }

        engine.set_registration(Arc::downgrade(self), target);
        self.lock().insert(target, engine);
    }

    pub fn get(&self, target: TargetId) -> Option<Arc<PersistStore>> {
        self.lock().get(&target).cloned()
    }

    /// Whether a live engine uses `name`.
    pub fn contains_name(&self, name: &str) -> bool {
        self.lock().values().any(|e| e.storage_name() == name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop the entry for `target` if it still points at `engine`.
    pub(crate) fn remove_engine(&self, target: TargetId, engine: &PersistStore) {
        let mut entries = self.lock();
        if entries
            .get(&target)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), engine))
        {
            entries.remove(&target);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TargetId, Arc<PersistStore>>> {
        self.entries.lock().expect("registry lock poisoned")
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .lock()
            .values()
            .map(|e| e.storage_name().to_string())
            .collect();
        f.debug_struct("StoreRegistry").field("names", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PersistDefaults, PersistOptions, ReactionOptions, StorageOptions};
    use keepsake_storage::{InMemoryStorage, StorageBackend};
    use keepsake_store::{ObservableStore, ReactiveTarget};
    use serde_json::json;

    fn engine_for(store: &Arc<ObservableStore>, name: &str) -> Arc<PersistStore> {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let options = PersistOptions::new(name)
            .property("list")
            .storage_options(StorageOptions::default().with_storage(storage));
        Arc::new(PersistStore::new(
            Arc::clone(store) as Arc<dyn ReactiveTarget>,
            options,
            ReactionOptions::default(),
            &PersistDefaults::default(),
        ))
    }

    fn store() -> Arc<ObservableStore> {
        Arc::new(ObservableStore::new().with_value("list", json!([])))
    }

    #[test]
    fn target_id_ignores_pointee_type() {
        let concrete = store();
        let erased: Arc<dyn ReactiveTarget> = concrete.clone();
        assert_eq!(TargetId::of(&concrete), TargetId::of(&erased));
        assert_ne!(TargetId::of(&concrete), TargetId::of(&store()));
    }

    #[test]
    fn register_and_get() {
        let registry = StoreRegistry::new();
        let target = store();
        let engine = engine_for(&target, "todo");
        registry.register(TargetId::of(&target), Arc::clone(&engine));

        let found = registry.get(TargetId::of(&target)).unwrap();
        assert!(Arc::ptr_eq(&found, &engine));
        assert!(registry.contains_name("todo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_name_stops_previous_engine() {
        let registry = StoreRegistry::new();
        let first_target = store();
        let second_target = store();
        let first = engine_for(&first_target, "shared");
        let second = engine_for(&second_target, "shared");

        registry.register(TargetId::of(&first_target), Arc::clone(&first));
        registry.register(TargetId::of(&second_target), Arc::clone(&second));

        assert!(first.is_stopped());
        assert!(!second.is_stopped());
        assert_eq!(registry.len(), 1);
        assert!(registry.get(TargetId::of(&first_target)).is_none());
    }

    #[test]
    fn reattaching_same_target_replaces_engine() {
        let registry = StoreRegistry::new();
        let target = store();
        let first = engine_for(&target, "a");
        let second = engine_for(&target, "b");

        registry.register(TargetId::of(&target), Arc::clone(&first));
        registry.register(TargetId::of(&target), Arc::clone(&second));

        assert!(first.is_stopped());
        let current = registry.get(TargetId::of(&target)).unwrap();
        assert!(Arc::ptr_eq(&current, &second));
    }

    #[test]
    fn stopping_removes_entry() {
        let registry = StoreRegistry::new();
        let target = store();
        let engine = engine_for(&target, "todo");
        registry.register(TargetId::of(&target), Arc::clone(&engine));

        engine.stop_persisting();
        assert!(registry.is_empty());
        // Idempotent.
        engine.stop_persisting();
        assert!(registry.is_empty());
    }
}
