//! Typed watch-event envelope produced by the manifest models.

use serde::{Deserialize, Serialize};

/// What happened to a manifest, decided at decode time from the raw store
/// event kind. Creates and updates collapse into `Upsert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Upsert,
    Remove,
}

/// One change to a manifest of kind `T`, delivered in store revision order.
///
/// `data` is `None` when no payload is available for the change; consumers
/// treat such upserts as no-ops. Removal events carry the last stored value
/// so that consumers can observe the final state of the manifest.
#[derive(Debug, Clone)]
pub struct ManifestEvent<T> {
    pub action: EventAction,
    /// Entity name (hostname for nodes, CIDR for subnets, self-link
    /// otherwise).
    pub name: String,
    /// Hostname of the owning node, for node-scoped manifests.
    pub node: Option<String>,
    /// Stable identifier of the manifest instance.
    pub self_link: String,
    /// Store revision at which this change was committed.
    pub revision: u64,
    pub data: Option<T>,
}

impl<T> ManifestEvent<T> {
    pub fn is_remove(&self) -> bool {
        self.action == EventAction::Remove
    }
}
