//! stevedore-cache — in-memory views of the manifest store.
//!
//! The caches hold the last observed manifest per entity and are kept
//! current by the runtime's watch loops. Readers get owned clones; the
//! locks are never held across an await point by the accessors.

pub mod node;
pub mod subnet;

pub use node::NodeCache;
pub use subnet::SubnetCache;
