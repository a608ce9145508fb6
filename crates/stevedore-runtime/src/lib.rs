//! stevedore-runtime — the reconciliation runtime.
//!
//! Subscribes to the manifest watch streams and folds every event into
//! the in-memory caches. Each entity kind gets its own supervised loop:
//! a stream that ends is reconnected from the last processed revision
//! with exponential backoff, so no event is processed twice and none is
//! lost across reconnects.

pub mod backoff;
pub mod runtime;

pub use backoff::Backoff;
pub use runtime::{Runtime, RuntimeHandle};
