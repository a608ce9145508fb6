//! stevedore-types — domain types for the Stevedore control plane.
//!
//! Defines the manifest records stored in the key-value store (nodes, pods,
//! volumes, endpoints, subnets), the typed watch-event envelope emitted by
//! the manifest models, and the pod status-aggregation state machine that
//! derives a single pod-level state from per-container states.
//!
//! All types are serializable to/from JSON for storage.

pub mod event;
pub mod manifest;
pub mod node;
pub mod pod;
pub mod state;

pub use event::{EventAction, ManifestEvent};
pub use manifest::{EndpointManifest, NetworkState, PodManifest, VolumeManifest};
pub use node::{Node, NodeMeta, NodeSpec, NodeStatus, PodNodeSpec};
pub use pod::{
    Container, ContainerSpec, ContainerState, Pod, PodContainersState, PodMeta, PodSecret,
    PodSpec, PodState,
};
