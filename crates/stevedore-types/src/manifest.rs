//! Manifest payloads watched by the reconciliation runtime.
//!
//! Pod and volume manifests are node-scoped (keyed by node hostname plus
//! self-link); endpoint and subnet manifests are name-scoped. Every
//! manifest carries a `state` field so that a removal can be rendered as a
//! terminal `destroy` tombstone in a cache instead of a silent
//! disappearance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pod::PodSpec;
use crate::state;

/// A pod spec as pushed down to a node for execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodManifest {
    pub state: String,
    pub spec: PodSpec,
    pub updated: u64,
}

/// A volume to be provisioned on a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeManifest {
    pub state: String,
    /// Host path backing the volume.
    pub path: String,
    pub capacity_mb: u64,
    pub updated: u64,
}

/// A service endpoint: virtual IP plus container-to-host port mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointManifest {
    pub state: String,
    pub ip: String,
    pub port_map: HashMap<u16, u16>,
    pub updated: u64,
}

/// Allocation state of one overlay subnet, keyed by CIDR.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub state: String,
    pub cidr: String,
    /// Interface the subnet is bound to.
    pub iface: String,
    /// Gateway address inside the subnet.
    pub addr: String,
}

impl EndpointManifest {
    /// Mark this manifest as a removal tombstone.
    pub fn set_destroy(&mut self) {
        self.state = state::DESTROY.to_string();
    }
}

impl NetworkState {
    /// Mark this state as a removal tombstone.
    pub fn set_destroy(&mut self) {
        self.state = state::DESTROY.to_string();
    }
}
