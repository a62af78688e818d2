//! The per-store persistence engine.
//!
//! Lifecycle:
//!
//! ```text
//!   Idle --hydrate--> Hydrating --start--> Persisting <--pause/start--> Paused
//!                                               |                          |
//!                                               +---------stop-------------+--> Stopped
//! ```
//!
//! `Stopped` is terminal: the engine releases its store, its properties and
//! its adapter, and every later call is a no-op.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use keepsake_storage::{Snapshot, StorageAdapter, SystemClock};
use keepsake_store::{PropertyKind, ReactiveTarget, StoreValue};
use tracing::{debug, warn};

use crate::config::{ClearMode, PersistDefaults, PersistOptions, ReactionOptions, ResolvedReaction};
use crate::error::SyncResult;
use crate::property::{make_serializable_properties, SerializableProperty};
use crate::reaction::{PersistContext, Subscription};
use crate::registry::{StoreRegistry, TargetId};

/// Where an engine is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Constructed; neither hydrated nor persisting yet.
    Idle,
    /// A hydration is in flight.
    Hydrating,
    /// Watching the store and writing changes.
    Persisting,
    /// Was persisting; currently not watching.
    Paused,
    /// Disposed. Terminal.
    Stopped,
}

struct EngineState {
    target: Option<Arc<dyn ReactiveTarget>>,
    properties: Arc<Vec<SerializableProperty>>,
    adapter: Option<Arc<StorageAdapter>>,
    subscription: Option<Subscription>,
    is_hydrated: bool,
    is_persisting: bool,
    hydrating: usize,
    started: bool,
    stopped: bool,
}

struct Registration {
    registry: Weak<StoreRegistry>,
    target: TargetId,
}

/// Binds one reactive store to one storage entry.
///
/// Options are resolved once, at construction, against the defaults passed
/// in. The engine never holds its state lock across an await point.
pub struct PersistStore {
    storage_name: String,
    debug_mode: bool,
    clear_mode: ClearMode,
    reaction: ResolvedReaction,
    state: Mutex<EngineState>,
    last_written: Arc<Mutex<Option<Snapshot>>>,
    registration: OnceLock<Registration>,
}

impl PersistStore {
    pub fn new(
        target: Arc<dyn ReactiveTarget>,
        options: PersistOptions,
        reaction: ReactionOptions,
        defaults: &PersistDefaults,
    ) -> Self {
        let PersistOptions {
            name,
            properties,
            storage,
            clock,
        } = options;

        let storage = storage.merged_over(&defaults.storage);
        let reaction = reaction.merged_over(&defaults.reaction).resolve();
        let adapter_options = storage.to_adapter_options();
        let debug_mode = adapter_options.debug_mode;
        let clear_mode = storage.clear_mode.unwrap_or_default();

        if adapter_options.storage.is_none() && cfg!(debug_assertions) {
            warn!(
                name = %name,
                "no storage backend configured; the store will not be persisted"
            );
        }

        let properties = make_serializable_properties(properties, debug_mode);
        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock));
        let adapter = StorageAdapter::with_clock(adapter_options, clock);

        if debug_mode {
            debug!(
                name = %name,
                properties = properties.len(),
                delay = ?reaction.delay,
                fire_immediately = reaction.fire_immediately,
                ?clear_mode,
                "persist store created"
            );
        }

        Self {
            storage_name: name,
            debug_mode,
            clear_mode,
            reaction,
            state: Mutex::new(EngineState {
                target: Some(target),
                properties: Arc::new(properties),
                adapter: Some(Arc::new(adapter)),
                subscription: None,
                is_hydrated: false,
                is_persisting: false,
                hydrating: 0,
                started: false,
                stopped: false,
            }),
            last_written: Arc::new(Mutex::new(None)),
            registration: OnceLock::new(),
        }
    }

    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    pub fn is_hydrated(&self) -> bool {
        self.lock().is_hydrated
    }

    pub fn is_persisting(&self) -> bool {
        self.lock().is_persisting
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn phase(&self) -> Phase {
        let state = self.lock();
        if state.stopped {
            Phase::Stopped
        } else if state.hydrating > 0 {
            Phase::Hydrating
        } else if state.is_persisting {
            Phase::Persisting
        } else if state.started {
            Phase::Paused
        } else {
            Phase::Idle
        }
    }

    /// Hydrate, then start persisting.
    pub async fn init(&self) {
        self.hydrate_store().await;
        self.start_persisting();
    }

    /// Load the stored snapshot into the store.
    ///
    /// Persisting is suspended for the duration so the hydration itself is
    /// not written back, and resumed afterwards if it was active. Only
    /// watched plain properties that the store already has and the snapshot
    /// contains are assigned; everything else is left alone.
    pub async fn hydrate_store(&self) {
        let (was_subscribed, target, adapter, properties) = {
            let mut state = self.lock();
            if state.stopped {
                return;
            }
            let was_subscribed = state.subscription.is_some();
            self.pause_locked(&mut state);
            state.is_hydrated = false;
            state.hydrating += 1;
            (
                was_subscribed,
                state.target.clone(),
                state.adapter.clone(),
                Arc::clone(&state.properties),
            )
        };

        if let (Some(target), Some(adapter)) = (target, adapter) {
            let data = adapter.get_item(&self.storage_name).await;
            let stopped = self.lock().stopped;
            if !stopped {
                let updates = hydration_updates(target.as_ref(), &properties, &data);
                if self.debug_mode {
                    debug!(
                        name = %self.storage_name,
                        stored = data.len(),
                        applied = updates.len(),
                        "store hydrated"
                    );
                }
                if !updates.is_empty() {
                    target.apply_batch(updates);
                }
            }
        }

        let resume = {
            let mut state = self.lock();
            state.hydrating = state.hydrating.saturating_sub(1);
            if state.stopped {
                false
            } else {
                state.is_hydrated = true;
                was_subscribed
            }
        };
        if resume {
            self.start_persisting();
        }
    }

    /// Begin watching the store. No-op if already watching or stopped.
    ///
    /// Must be called from within a Tokio runtime; outside one it logs and
    /// does nothing.
    pub fn start_persisting(&self) {
        let mut state = self.lock();
        if state.stopped {
            return;
        }
        if state.subscription.as_ref().is_some_and(|s| !s.is_finished()) {
            return;
        }
        let (Some(target), Some(adapter)) = (state.target.clone(), state.adapter.clone()) else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(name = %self.storage_name, "cannot start persisting outside a Tokio runtime");
            return;
        }

        let ctx = PersistContext {
            storage_name: self.storage_name.clone(),
            target,
            properties: Arc::clone(&state.properties),
            adapter,
            reaction: self.reaction,
            debug_mode: self.debug_mode,
            last_written: Arc::clone(&self.last_written),
        };
        state.subscription = Some(Subscription::spawn(ctx));
        state.is_persisting = true;
        state.started = true;

        if self.debug_mode {
            debug!(name = %self.storage_name, "persisting started");
        }
    }

    /// Stop watching the store. Idempotent. A write already in flight
    /// completes.
    pub fn pause_persisting(&self) {
        let mut state = self.lock();
        self.pause_locked(&mut state);
    }

    /// Stop permanently and release the store. Idempotent.
    pub fn stop_persisting(&self) {
        {
            let mut state = self.lock();
            if state.stopped {
                return;
            }
            self.pause_locked(&mut state);
            state.stopped = true;
            state.target = None;
            state.adapter = None;
            state.properties = Arc::new(Vec::new());
        }

        if let Some(registration) = self.registration.get() {
            if let Some(registry) = registration.registry.upgrade() {
                registry.remove_engine(registration.target, self);
            }
        }

        if self.debug_mode {
            debug!(name = %self.storage_name, "persisting stopped");
        }
    }

    /// Alias for [`PersistStore::stop_persisting`].
    pub fn dispose(&self) {
        self.stop_persisting();
    }

    /// Delete (or blank, per the configured clear mode) the stored entry.
    /// The live store is not touched.
    pub async fn clear_persisted_store(&self) -> SyncResult<()> {
        let adapter = self.lock().adapter.clone();
        let Some(adapter) = adapter else {
            return Ok(());
        };
        if self.debug_mode {
            debug!(name = %self.storage_name, mode = ?self.clear_mode, "clearing persisted store");
        }
        let cleared = match self.clear_mode {
            ClearMode::Remove => adapter.remove_item(&self.storage_name).await,
            ClearMode::WriteEmpty => adapter.set_item(&self.storage_name, Snapshot::new()).await,
        };
        // Storage no longer holds the last written snapshot; the next change
        // must be written even if it restores that snapshot.
        *self.last_written.lock().expect("lock poisoned") = None;
        cleared?;
        Ok(())
    }

    /// The validated stored snapshot. `None` once stopped.
    pub async fn get_persisted_store(&self) -> Option<Snapshot> {
        let adapter = self.lock().adapter.clone()?;
        Some(adapter.get_item(&self.storage_name).await)
    }

    pub(crate) fn set_registration(&self, registry: Weak<StoreRegistry>, target: TargetId) {
        let _ = self.registration.set(Registration { registry, target });
    }

    fn pause_locked(&self, state: &mut EngineState) {
        if let Some(subscription) = state.subscription.take() {
            subscription.cancel();
            if self.debug_mode {
                debug!(name = %self.storage_name, "persisting paused");
            }
        }
        state.is_persisting = false;
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine lock poisoned")
    }
}

impl std::fmt::Debug for PersistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistStore")
            .field("storage_name", &self.storage_name)
            .field("phase", &self.phase())
            .field("reaction", &self.reaction)
            .field("clear_mode", &self.clear_mode)
            .finish()
    }
}

/// Assignments that bring `target` in line with the stored `data`.
///
/// A stored array is restored as a map or set when the property currently
/// holds one.
fn hydration_updates(
    target: &dyn ReactiveTarget,
    properties: &[SerializableProperty],
    data: &Snapshot,
) -> Vec<(String, StoreValue)> {
    properties
        .iter()
        .filter_map(|property| {
            let key = property.key();
            if !target.has_property(key) || target.property_kind(key) != PropertyKind::Plain {
                return None;
            }
            let stored = data.get(key)?;
            let incoming = match target.get(key) {
                Some(StoreValue::Map(_)) => StoreValue::map_from_json(stored),
                Some(StoreValue::Set(_)) => StoreValue::set_from_json(stored),
                _ => None,
            }
            .unwrap_or_else(|| StoreValue::Plain(stored.clone()));
            Some((key.to_string(), property.deserialize(incoming)))
        })
        .collect()
}
