//! Persist selected properties of a reactive store to key-value storage.
//!
//! ```no_run
//! use std::sync::Arc;
//! use keepsake::{InMemoryStorage, ObservableStore, PersistOptions, ReactionOptions, StorageOptions};
//! use serde_json::json;
//!
//! # async fn demo() {
//! keepsake::configure(
//!     StorageOptions::default().with_storage(Arc::new(InMemoryStorage::new())),
//!     ReactionOptions::default(),
//! );
//!
//! let todos = Arc::new(ObservableStore::new().with_value("list", json!([])));
//! let handle = keepsake::attach(
//!     &todos,
//!     PersistOptions::new("todo").property("list"),
//!     ReactionOptions::default(),
//! )
//! .await;
//!
//! todos.set("list", json!(["milk"]));
//! // ... later
//! handle.dispose();
//! # }
//! ```
//!
//! The free functions operate on [`Persistor::global`]. Embedders that want
//! several independent sets of defaults create their own [`Persistor`].

pub mod error;
pub mod persistor;

use std::sync::Arc;

pub use error::{PersistError, PersistResult};
pub use persistor::Persistor;

// Re-export the types callers need to attach a store.
pub use keepsake_storage::{
    Clock, FileStorage, InMemoryStorage, ManualClock, Snapshot, StorageBackend, StorageError,
    SystemClock, METADATA_FIELD,
};
pub use keepsake_store::{ObservableStore, PropertyKind, ReactiveTarget, StoreValue};
pub use keepsake_sync::{
    ClearMode, PersistDefaults, PersistOptions, PersistStore, Phase, PropertyDescriptor,
    PropertySpec, ReactionOptions, StorageOptions,
};

/// Replace the process-wide defaults.
pub fn configure(storage: StorageOptions, reaction: ReactionOptions) {
    Persistor::global().configure(storage, reaction);
}

/// Attach `target` to the process-wide persistor. See [`Persistor::attach`].
pub async fn attach<T>(
    target: &Arc<T>,
    options: PersistOptions,
    reaction: ReactionOptions,
) -> Arc<PersistStore>
where
    T: ReactiveTarget + 'static,
{
    Persistor::global().attach(target, options, reaction).await
}

pub fn pause<T: ?Sized>(target: &Arc<T>) {
    Persistor::global().pause(target);
}

pub fn start<T: ?Sized>(target: &Arc<T>) {
    Persistor::global().start(target);
}

pub fn stop<T: ?Sized>(target: &Arc<T>) {
    Persistor::global().stop(target);
}

pub async fn clear<T: ?Sized>(target: &Arc<T>) -> PersistResult<()> {
    Persistor::global().clear(target).await
}

pub async fn hydrate<T: ?Sized>(target: &Arc<T>) {
    Persistor::global().hydrate(target).await;
}

pub async fn get_persisted_snapshot<T: ?Sized>(target: &Arc<T>) -> Option<Snapshot> {
    Persistor::global().get_persisted_snapshot(target).await
}

pub fn is_hydrated<T: ?Sized>(target: &Arc<T>) -> bool {
    Persistor::global().is_hydrated(target)
}

pub fn is_persisting<T: ?Sized>(target: &Arc<T>) -> bool {
    Persistor::global().is_persisting(target)
}
