//! Synchronization engine for Keepsake.
//!
//! A [`PersistStore`] binds one reactive store to one storage entry. It
//! hydrates the store's watched properties from storage, then watches the
//! store and writes a fresh snapshot (optionally debounced) whenever one of
//! them changes.
//!
//! # Modules
//!
//! - [`property`] -- normalizing the watched-property list
//! - [`config`] -- per-engine options, process-wide defaults, TOML loading
//! - [`engine`] -- the engine and its lifecycle
//! - [`registry`] -- live store to engine lookup

pub mod config;
pub mod engine;
pub mod error;
pub mod property;
mod reaction;
pub mod registry;

pub use config::{
    ClearMode, ConfigRegistry, DefaultsFile, PersistDefaults, PersistOptions, ReactionOptions,
    ResolvedReaction, StorageOptions,
};
pub use engine::{Phase, PersistStore};
pub use error::{SyncError, SyncResult};
pub use property::{
    make_serializable_properties, DeserializeFn, PropertyDescriptor, PropertySpec,
    SerializableProperty, SerializeFn,
};
pub use registry::{StoreRegistry, TargetId};
