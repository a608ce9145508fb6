//! redb table definitions for the key store.
//!
//! `KV` holds the manifests themselves: hierarchical `&str` keys mapping to
//! JSON-serialized value envelopes. `EVENTS` is the committed-change
//! journal keyed by revision, read back when a watch resumes. `META` holds
//! the store-wide revision counter.

use redb::TableDefinition;

/// Manifest values keyed by hierarchical path.
pub const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// Committed change events keyed by revision.
pub const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");

/// Store metadata (revision counter).
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key of the revision counter inside `META`.
pub const REVISION_KEY: &str = "revision";
