//! The reactive-store side of Keepsake.
//!
//! The persistence engine does not care how a store tracks mutations. It
//! consumes the [`ReactiveTarget`] capability: read a property, classify it
//! (plain / computed / action), assign several properties atomically, and
//! subscribe to change notifications.
//!
//! [`ObservableStore`] is a small reference implementation used by the
//! engine's tests and by embedders that have no reactive framework of their
//! own.

pub mod observable;
pub mod target;
pub mod value;

pub use observable::{Batch, Fields, ObservableStore};
pub use target::{ChangeReceiver, PropertyKind, ReactiveTarget};
pub use value::StoreValue;
