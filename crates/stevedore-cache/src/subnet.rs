//! Overlay subnet cache keyed by CIDR.

use std::collections::HashMap;

use tokio::sync::RwLock;

use stevedore_types::NetworkState;

/// Last observed allocation state per subnet.
#[derive(Default)]
pub struct SubnetCache {
    inner: RwLock<HashMap<String, NetworkState>>,
}

impl SubnetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the state for one subnet. Stale state is removed first so
    /// the new value is never merged with it.
    pub async fn set_subnet(&self, cidr: &str, state: NetworkState) {
        let mut inner = self.inner.write().await;
        inner.remove(cidr);
        inner.insert(cidr.to_string(), state);
    }

    pub async fn del_subnet(&self, cidr: &str) {
        self.inner.write().await.remove(cidr);
    }

    pub async fn get_subnet(&self, cidr: &str) -> Option<NetworkState> {
        self.inner.read().await.get(cidr).cloned()
    }

    pub async fn subnets(&self) -> HashMap<String, NetworkState> {
        self.inner.read().await.clone()
    }
}
