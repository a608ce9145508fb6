//! Raw change events emitted by the store.

use serde::{Deserialize, Serialize};

/// Kind of a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

/// One committed change under a watched prefix.
///
/// Delete events carry the last stored value in `data` so that consumers
/// can observe what was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: EventKind,
    pub key: String,
    /// Store revision assigned to this change.
    pub revision: u64,
    pub data: Option<serde_json::Value>,
}
