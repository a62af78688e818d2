use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::target::{ChangeReceiver, PropertyKind, ReactiveTarget};
use crate::value::StoreValue;

type ComputedFn = Arc<dyn Fn(&Fields<'_>) -> StoreValue + Send + Sync>;
type ActionFn = Arc<dyn Fn(&ObservableStore) + Send + Sync>;

enum Slot {
    Stored(StoreValue),
    Computed(ComputedFn),
    Action(ActionFn),
}

/// Read-only view of a store's plain properties, handed to computed
/// properties when they are evaluated.
pub struct Fields<'a> {
    slots: &'a BTreeMap<String, Slot>,
}

impl Fields<'_> {
    pub fn get(&self, key: &str) -> Option<&StoreValue> {
        match self.slots.get(key) {
            Some(Slot::Stored(value)) => Some(value),
            _ => None,
        }
    }
}

/// A small observable property store.
///
/// Properties are plain values, computed values derived from the plain
/// ones, or actions. Every committed mutation bumps a revision counter that
/// subscribers observe through a `tokio::sync::watch` channel. Mutations
/// inside [`ObservableStore::batch`] are committed together and notify once.
pub struct ObservableStore {
    slots: RwLock<BTreeMap<String, Slot>>,
    revision: watch::Sender<u64>,
}

/// Pending mutations collected by [`ObservableStore::batch`].
#[derive(Default)]
pub struct Batch {
    updates: Vec<(String, StoreValue)>,
}

impl Batch {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StoreValue>) -> &mut Self {
        self.updates.push((key.into(), value.into()));
        self
    }
}

impl ObservableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            slots: RwLock::new(BTreeMap::new()),
            revision,
        }
    }

    /// Builder: declare a plain property.
    pub fn with_value(self, key: impl Into<String>, value: impl Into<StoreValue>) -> Self {
        self.define_value(key, value);
        self
    }

    /// Builder: declare a computed property.
    pub fn with_computed<F>(self, key: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Fields<'_>) -> StoreValue + Send + Sync + 'static,
    {
        self.define_computed(key, compute);
        self
    }

    /// Builder: declare an action.
    pub fn with_action<F>(self, key: impl Into<String>, action: F) -> Self
    where
        F: Fn(&ObservableStore) + Send + Sync + 'static,
    {
        self.define_action(key, action);
        self
    }

    /// Declare a plain property without notifying subscribers.
    pub fn define_value(&self, key: impl Into<String>, value: impl Into<StoreValue>) {
        self.write_slots()
            .insert(key.into(), Slot::Stored(value.into()));
    }

    pub fn define_computed<F>(&self, key: impl Into<String>, compute: F)
    where
        F: Fn(&Fields<'_>) -> StoreValue + Send + Sync + 'static,
    {
        self.write_slots()
            .insert(key.into(), Slot::Computed(Arc::new(compute)));
    }

    pub fn define_action<F>(&self, key: impl Into<String>, action: F)
    where
        F: Fn(&ObservableStore) + Send + Sync + 'static,
    {
        self.write_slots()
            .insert(key.into(), Slot::Action(Arc::new(action)));
    }

    /// Assign a plain property and notify. Returns `false` (and changes
    /// nothing) if `key` is computed or an action.
    pub fn set(&self, key: impl Into<String>, value: impl Into<StoreValue>) -> bool {
        let mut batch = Batch::default();
        batch.set(key, value);
        self.commit(batch.updates) > 0
    }

    /// Modify a plain property in place and notify. Returns `false` if the
    /// property is missing or not plain.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut StoreValue)) -> bool {
        {
            let mut slots = self.write_slots();
            match slots.get_mut(key) {
                Some(Slot::Stored(value)) => f(value),
                _ => return false,
            }
        }
        self.notify(1);
        true
    }

    /// Run several assignments as one committed update.
    pub fn batch(&self, build: impl FnOnce(&mut Batch)) -> usize {
        let mut batch = Batch::default();
        build(&mut batch);
        self.commit(batch.updates)
    }

    /// Delete a property. Removing a plain property notifies.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.write_slots().remove(key);
        match removed {
            Some(Slot::Stored(_)) => {
                self.notify(1);
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Invoke an action by name. Returns `false` if `key` is not an action.
    pub fn run_action(&self, key: &str) -> bool {
        let action = match self.read_slots().get(key) {
            Some(Slot::Action(action)) => Arc::clone(action),
            _ => return false,
        };
        action(self);
        true
    }

    /// Convenience accessor for plain JSON values.
    pub fn get_json(&self, key: &str) -> Option<Value> {
        self.get(key).map(|v| v.to_json())
    }

    /// All property names, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.read_slots().keys().cloned().collect()
    }

    /// Number of committed changes so far.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Assign plain properties under one lock and notify once.
    fn commit(&self, updates: Vec<(String, StoreValue)>) -> usize {
        let applied = {
            let mut slots = self.write_slots();
            let mut applied = 0;
            for (key, value) in updates {
                match slots.get(&key) {
                    Some(Slot::Computed(_)) | Some(Slot::Action(_)) => {
                        debug!(key = %key, "ignoring assignment to non-data property");
                    }
                    _ => {
                        slots.insert(key, Slot::Stored(value));
                        applied += 1;
                    }
                }
            }
            applied
        };
        self.notify(applied);
        applied
    }

    fn notify(&self, applied: usize) {
        if applied > 0 {
            self.revision.send_modify(|rev| *rev += 1);
        }
    }

    fn read_slots(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Slot>> {
        self.slots.read().expect("store lock poisoned")
    }

    fn write_slots(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Slot>> {
        self.slots.write().expect("store lock poisoned")
    }
}

impl Default for ObservableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveTarget for ObservableStore {
    fn get(&self, key: &str) -> Option<StoreValue> {
        let slots = self.read_slots();
        match slots.get(key)? {
            Slot::Stored(value) => Some(value.clone()),
            Slot::Computed(compute) => {
                let compute = Arc::clone(compute);
                Some(compute(&Fields { slots: &slots }))
            }
            Slot::Action(_) => None,
        }
    }

    fn has_property(&self, key: &str) -> bool {
        self.read_slots().contains_key(key)
    }

    fn property_kind(&self, key: &str) -> PropertyKind {
        match self.read_slots().get(key) {
            Some(Slot::Computed(_)) => PropertyKind::Computed,
            Some(Slot::Action(_)) => PropertyKind::Action,
            _ => PropertyKind::Plain,
        }
    }

    fn apply_batch(&self, updates: Vec<(String, StoreValue)>) {
        self.commit(updates);
    }

    fn subscribe(&self) -> ChangeReceiver {
        self.revision.subscribe()
    }
}

impl std::fmt::Debug for ObservableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableStore")
            .field("keys", &self.keys())
            .field("revision", &self.revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn todo_store() -> ObservableStore {
        ObservableStore::new()
            .with_value("list", json!(["a", "b"]))
            .with_value("title", json!("todo"))
            .with_computed("count", |fields| {
                let n = fields
                    .get("list")
                    .and_then(StoreValue::as_plain)
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                StoreValue::Plain(json!(n))
            })
            .with_action("reset", |store| {
                store.set("list", json!([]));
            })
    }

    #[test]
    fn get_plain_and_computed() {
        let store = todo_store();
        assert_eq!(store.get_json("list"), Some(json!(["a", "b"])));
        assert_eq!(store.get_json("count"), Some(json!(2)));
        assert!(store.get("reset").is_none());
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn property_kinds() {
        let store = todo_store();
        assert_eq!(store.property_kind("list"), PropertyKind::Plain);
        assert_eq!(store.property_kind("count"), PropertyKind::Computed);
        assert_eq!(store.property_kind("reset"), PropertyKind::Action);
        assert!(store.has_property("reset"));
        assert!(!store.has_property("missing"));
    }

    #[test]
    fn set_bumps_revision() {
        let store = todo_store();
        assert_eq!(store.revision(), 0);
        assert!(store.set("title", json!("done")));
        assert_eq!(store.revision(), 1);
        assert_eq!(store.get_json("title"), Some(json!("done")));
    }

    #[test]
    fn set_rejects_computed_and_actions() {
        let store = todo_store();
        assert!(!store.set("count", json!(9)));
        assert!(!store.set("reset", json!(9)));
        assert_eq!(store.revision(), 0);
        assert_eq!(store.get_json("count"), Some(json!(2)));
    }

    #[test]
    fn batch_notifies_once() {
        let store = todo_store();
        let mut rx = store.subscribe();
        let applied = store.batch(|b| {
            b.set("title", json!("x")).set("list", json!(["z"]));
        });
        assert_eq!(applied, 2);
        assert_eq!(store.revision(), 1);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn apply_batch_skips_non_data() {
        let store = todo_store();
        store.apply_batch(vec![
            ("count".into(), StoreValue::Plain(json!(5))),
            ("title".into(), StoreValue::Plain(json!("y"))),
        ]);
        assert_eq!(store.get_json("title"), Some(json!("y")));
        assert_eq!(store.property_kind("count"), PropertyKind::Computed);
    }

    #[test]
    fn empty_batch_does_not_notify() {
        let store = todo_store();
        assert_eq!(store.batch(|_| {}), 0);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn update_in_place() {
        let store = ObservableStore::new().with_value("tags", StoreValue::set([json!("a")]));
        assert!(store.update("tags", |v| {
            if let StoreValue::Set(items) = v {
                items.push(json!("b"));
            }
        }));
        assert_eq!(store.get_json("tags"), Some(json!(["a", "b"])));
        assert!(!store.update("missing", |_| {}));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn run_action_mutates_store() {
        let store = todo_store();
        assert!(store.run_action("reset"));
        assert_eq!(store.get_json("list"), Some(json!([])));
        assert_eq!(store.get_json("count"), Some(json!(0)));
        assert!(!store.run_action("list"));
    }

    #[test]
    fn remove_property() {
        let store = todo_store();
        assert!(store.remove("title"));
        assert!(!store.has_property("title"));
        assert!(!store.remove("title"));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn subscriber_starts_caught_up() {
        let store = todo_store();
        store.set("title", json!("before"));
        let rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());
        store.set("title", json!("after"));
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn subscriber_wakes_on_change() {
        let store = Arc::new(todo_store());
        let mut rx = store.subscribe();
        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            writer.set("title", json!("async"));
        });
        rx.changed().await.unwrap();
        assert_eq!(store.get_json("title"), Some(json!("async")));
    }

    #[test]
    fn debug_lists_keys() {
        let store = todo_store();
        let debug = format!("{store:?}");
        assert!(debug.contains("ObservableStore"));
        assert!(debug.contains("list"));
    }
}
