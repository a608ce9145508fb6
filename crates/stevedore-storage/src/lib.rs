//! stevedore-storage — typed manifest models over the key store.
//!
//! One model per entity kind (node, pod, volume, endpoint, subnet). Each
//! model knows its own key shapes, translates generic store results into
//! its manifest type, and exposes a watch producing typed
//! [`stevedore_types::ManifestEvent`] values from a given revision.
//!
//! Models are constructed with an explicit [`stevedore_store::KeyStore`]
//! handle; there is no process-wide registry.

pub mod endpoint;
pub mod error;
pub mod node;
pub mod paths;
pub mod pod;
pub mod subnet;
pub mod volume;
mod watch;

pub use endpoint::EndpointModel;
pub use error::{StorageError, StorageResult};
pub use node::NodeModel;
pub use pod::PodModel;
pub use subnet::SubnetModel;
pub use volume::VolumeModel;
