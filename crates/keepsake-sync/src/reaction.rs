//! The change subscription that writes a store back to storage.
//!
//! One subscription is one spawned task:
//!
//! ```text
//!   [fire immediately?] -> wait for change -> [debounce delay] -> snapshot
//!          ^                                                        |
//!          +----------------- write if snapshot changed <-----------+
//! ```
//!
//! Changes arriving during the delay are folded into the same write.
//! Cancelling stops future triggers; a write already handed to the backend
//! runs to completion.

use std::sync::{Arc, Mutex};

use keepsake_storage::{Snapshot, StorageAdapter};
use keepsake_store::{PropertyKind, ReactiveTarget};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::ResolvedReaction;
use crate::property::SerializableProperty;

/// Everything a running subscription needs, shared with the engine.
#[derive(Clone)]
pub(crate) struct PersistContext {
    pub storage_name: String,
    pub target: Arc<dyn ReactiveTarget>,
    pub properties: Arc<Vec<SerializableProperty>>,
    pub adapter: Arc<StorageAdapter>,
    pub reaction: ResolvedReaction,
    pub debug_mode: bool,
    /// Snapshot most recently written by this engine. The engine resets it
    /// to `None` whenever storage changes behind the subscription's back.
    pub last_written: Arc<Mutex<Option<Snapshot>>>,
}

impl PersistContext {
    /// Serialize the watched properties into a snapshot.
    ///
    /// Computed properties and actions never persist; each one found is
    /// reported.
    pub fn collect_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for property in self.properties.iter() {
            let key = property.key();
            match self.target.property_kind(key) {
                PropertyKind::Computed => {
                    if cfg!(debug_assertions) {
                        warn!(key, "property is computed and will not persist");
                    }
                    continue;
                }
                PropertyKind::Action => {
                    if cfg!(debug_assertions) {
                        warn!(key, "property is an action and will not persist");
                    }
                    continue;
                }
                PropertyKind::Plain => {}
            }
            let Some(value) = self.target.get(key) else {
                continue;
            };
            snapshot.insert(key.to_string(), property.serialize(&value).to_json());
        }
        snapshot
    }

    async fn write_if_changed(&self) {
        let snapshot = self.collect_snapshot();
        if self.last_written().as_ref() == Some(&snapshot) {
            return;
        }
        match self.adapter.set_item(&self.storage_name, snapshot.clone()).await {
            Ok(()) => {
                if self.debug_mode {
                    debug!(name = %self.storage_name, fields = snapshot.len(), "store persisted");
                }
                *self.last_written() = Some(snapshot);
            }
            Err(e) => {
                error!(name = %self.storage_name, error = %e, "failed to persist store");
            }
        }
    }

    fn last_written(&self) -> std::sync::MutexGuard<'_, Option<Snapshot>> {
        self.last_written.lock().expect("lock poisoned")
    }
}

/// Handle to a running subscription.
pub(crate) struct Subscription {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Start watching. Must be called from within a Tokio runtime.
    pub fn spawn(ctx: PersistContext) -> Self {
        let (cancel, cancelled) = watch::channel(false);
        let changes = ctx.target.subscribe();
        // Taken now so a change landing before the task first runs is seen
        // as a change.
        let baseline = (!ctx.reaction.fire_immediately).then(|| ctx.collect_snapshot());
        *ctx.last_written() = baseline;
        let task = tokio::spawn(run(ctx, changes, cancelled));
        Self { cancel, task }
    }

    /// Stop future writes. Does not interrupt a write in progress.
    pub fn cancel(self) {
        let _ = self.cancel.send(true);
    }

    /// The task has exited, e.g. because the store went away.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

async fn run(
    ctx: PersistContext,
    mut changes: keepsake_store::ChangeReceiver,
    mut cancelled: watch::Receiver<bool>,
) {
    if *cancelled.borrow() {
        return;
    }

    if ctx.reaction.fire_immediately {
        ctx.write_if_changed().await;
    }

    loop {
        tokio::select! {
            biased;
            _ = cancelled.changed() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        if let Some(delay) = ctx.reaction.delay {
            tokio::select! {
                biased;
                _ = cancelled.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if *cancelled.borrow() {
            break;
        }
        changes.borrow_and_update();
        ctx.write_if_changed().await;
    }

    if ctx.debug_mode {
        debug!(name = %ctx.storage_name, "subscription ended");
    }
}
