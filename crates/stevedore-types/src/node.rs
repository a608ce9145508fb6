//! Node records — identity, online status, and the pods scheduled to a node.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pod::{PodMeta, PodSpec};

/// A worker node known to the control plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub meta: NodeMeta,
    pub status: NodeStatus,
    pub spec: NodeSpec,
}

/// Node identity and metadata. Stored under `node/<hostname>/meta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub id: String,
    pub hostname: String,
    pub labels: HashMap<String, String>,
    /// Unix timestamp (seconds) when this node was registered.
    pub created: u64,
    /// Unix timestamp (seconds) of the last mutation touching this node.
    pub updated: u64,
}

/// Node liveness. Stored under `node/<hostname>/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub online: bool,
}

/// The set of pods scheduled to a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub pods: Vec<PodNodeSpec>,
}

/// A pod as attached to a node: its metadata plus container spec.
/// Stored under `node/<hostname>/pod/<self_link>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodNodeSpec {
    pub meta: PodMeta,
    pub spec: PodSpec,
}
