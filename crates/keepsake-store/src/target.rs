use tokio::sync::watch;

use crate::value::StoreValue;

/// How a store property behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    /// Assignable data.
    Plain,
    /// Derived from other properties; cannot be assigned.
    Computed,
    /// Executable; not data.
    Action,
}

/// Receiver side of a store's change notifications.
///
/// The carried value is a revision counter bumped once per committed
/// mutation or batch. Only the fact that it moved matters.
pub type ChangeReceiver = watch::Receiver<u64>;

/// The capability a reactive store exposes to the persistence engine.
///
/// Implementations must satisfy these invariants:
/// - `apply_batch` commits all updates before notifying, so observers see
///   one consistent change rather than one per field.
/// - Every committed change to a plain property bumps the revision seen by
///   `subscribe` receivers.
/// - `get` of a computed property returns its current derived value; `get`
///   of an action returns `None`.
pub trait ReactiveTarget: Send + Sync {
    /// Current value of `key`, if it exists and is readable.
    fn get(&self, key: &str) -> Option<StoreValue>;

    /// Whether `key` is an own property of the store.
    fn has_property(&self, key: &str) -> bool;

    /// Classify `key`. Hosts without introspection declare everything they
    /// expose as plain data.
    fn property_kind(&self, _key: &str) -> PropertyKind {
        PropertyKind::Plain
    }

    /// Assign several plain properties as one atomic update.
    fn apply_batch(&self, updates: Vec<(String, StoreValue)>);

    /// Subscribe to change notifications. The returned receiver treats the
    /// current revision as already seen.
    fn subscribe(&self) -> ChangeReceiver;
}
