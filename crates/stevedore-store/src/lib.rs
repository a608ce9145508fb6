//! stevedore-store — transactional, watchable key-value store.
//!
//! Backed by [redb](https://docs.rs/redb), the store keeps manifests under
//! hierarchical slash-delimited keys (`cluster/node/<hostname>/meta`) and
//! offers three things on top of plain CRUD:
//!
//! - staged write transactions: `create`/`update`/`delete`/`delete_dir`
//!   queued on a [`Txn`] apply atomically at `commit`, or not at all;
//! - a store-wide monotonic revision, bumped once per committed write;
//! - prefix watches: every committed change is journaled by revision and
//!   fanned out to subscribers, so a watch can resume from the revision it
//!   last processed after a disconnect.
//!
//! The `KeyStore` is `Clone + Send + Sync` (backed by `Arc<Database>`) and
//! can be shared across async tasks.

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::StoreError::$variant(e.to_string())
    };
}
pub(crate) use map_err;

pub mod error;
pub mod event;
pub mod keys;
pub mod store;
pub mod tables;
pub mod txn;

pub use error::{StoreError, StoreResult};
pub use event::{EventKind, RawEvent};
pub use keys::KeyBuilder;
pub use store::KeyStore;
pub use txn::Txn;
