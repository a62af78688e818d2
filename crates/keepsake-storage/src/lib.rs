//! Key-value storage for Keepsake.
//!
//! Two layers live here:
//!
//! - [`StorageBackend`] -- the raw medium: get / set / remove of a
//!   [`serde_json::Value`] under a string key. It never interprets what it
//!   stores.
//! - [`StorageAdapter`] -- wraps a backend with serialization, expiration
//!   metadata and version tagging, and self-heals stale entries on read.
//!
//! # Storage Backends
//!
//! - [`InMemoryStorage`] -- `HashMap`-based backend for tests and embedding
//! - [`FileStorage`] -- one JSON file per key under a directory
//!
//! # Design Rules
//!
//! 1. Reads never fail on bad data: malformed, expired or version-mismatched
//!    entries read as an empty snapshot.
//! 2. Write and remove errors always propagate to the caller.
//! 3. Metadata lives under a reserved field ([`METADATA_FIELD`]) that no
//!    persisted property may use.
//! 4. An adapter without a backend is valid and turns every write into a
//!    no-op.

pub mod adapter;
pub mod clock;
pub mod envelope;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use adapter::{AdapterOptions, StorageAdapter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use envelope::{EnvelopeMeta, Snapshot, METADATA_FIELD};
pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use memory::InMemoryStorage;
pub use traits::StorageBackend;
