//! Per-node manifest cache: pods and volumes keyed by (node, self-link),
//! endpoints keyed by name.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use stevedore_types::{EndpointManifest, PodManifest, VolumeManifest};

#[derive(Default)]
struct Inner {
    pods: HashMap<(String, String), PodManifest>,
    volumes: HashMap<(String, String), VolumeManifest>,
    endpoints: HashMap<String, EndpointManifest>,
}

/// Last observed manifest per pod, volume, and endpoint.
///
/// Writers replace whole entries (delete then insert); a stale value is
/// never merged with a fresh one.
#[derive(Default)]
pub struct NodeCache {
    inner: RwLock<Inner>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Pods ──────────────────────────────────────────────────────────

    pub async fn set_pod(&self, node: &str, self_link: &str, manifest: PodManifest) {
        let key = (node.to_string(), self_link.to_string());
        let mut inner = self.inner.write().await;
        inner.pods.remove(&key);
        inner.pods.insert(key, manifest);
    }

    pub async fn del_pod(&self, node: &str, self_link: &str) {
        let key = (node.to_string(), self_link.to_string());
        self.inner.write().await.pods.remove(&key);
    }

    pub async fn get_pod(&self, node: &str, self_link: &str) -> Option<PodManifest> {
        let key = (node.to_string(), self_link.to_string());
        self.inner.read().await.pods.get(&key).cloned()
    }

    /// All pod manifests cached for one node, keyed by self-link.
    pub async fn pod_manifests(&self, node: &str) -> HashMap<String, PodManifest> {
        self.inner
            .read()
            .await
            .pods
            .iter()
            .filter(|((n, _), _)| n == node)
            .map(|((_, link), m)| (link.clone(), m.clone()))
            .collect()
    }

    // ── Volumes ───────────────────────────────────────────────────────

    pub async fn set_volume(&self, node: &str, self_link: &str, manifest: VolumeManifest) {
        let key = (node.to_string(), self_link.to_string());
        let mut inner = self.inner.write().await;
        inner.volumes.remove(&key);
        inner.volumes.insert(key, manifest);
    }

    pub async fn del_volume(&self, node: &str, self_link: &str) {
        let key = (node.to_string(), self_link.to_string());
        self.inner.write().await.volumes.remove(&key);
    }

    pub async fn get_volume(&self, node: &str, self_link: &str) -> Option<VolumeManifest> {
        let key = (node.to_string(), self_link.to_string());
        self.inner.read().await.volumes.get(&key).cloned()
    }

    // ── Endpoints ─────────────────────────────────────────────────────

    pub async fn set_endpoint(&self, name: &str, manifest: EndpointManifest) {
        let mut inner = self.inner.write().await;
        inner.endpoints.remove(name);
        inner.endpoints.insert(name.to_string(), manifest);
    }

    pub async fn del_endpoint(&self, name: &str) {
        self.inner.write().await.endpoints.remove(name);
    }

    pub async fn get_endpoint(&self, name: &str) -> Option<EndpointManifest> {
        self.inner.read().await.endpoints.get(name).cloned()
    }

    pub async fn endpoints(&self) -> HashMap<String, EndpointManifest> {
        self.inner.read().await.endpoints.clone()
    }

    /// Drop every pod and volume entry belonging to one node. Endpoints
    /// are cluster-scoped and stay.
    pub async fn clear(&self, node: &str) {
        let mut inner = self.inner.write().await;
        inner.pods.retain(|(n, _), _| n != node);
        inner.volumes.retain(|(n, _), _| n != node);
        debug!(%node, "node cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_types::state;

    fn pod(state: &str) -> PodManifest {
        PodManifest {
            state: state.to_string(),
            ..PodManifest::default()
        }
    }

    #[tokio::test]
    async fn set_overwrites_previous_entry() {
        let cache = NodeCache::new();
        cache.set_pod("h1", "p1", pod(state::CREATED)).await;
        cache.set_pod("h1", "p1", pod(state::RUNNING)).await;

        let got = cache.get_pod("h1", "p1").await.unwrap();
        assert_eq!(got.state, state::RUNNING);
        assert_eq!(cache.pod_manifests("h1").await.len(), 1);
    }

    #[tokio::test]
    async fn del_removes_only_that_entry() {
        let cache = NodeCache::new();
        cache.set_pod("h1", "p1", pod(state::RUNNING)).await;
        cache.set_pod("h1", "p2", pod(state::RUNNING)).await;

        cache.del_pod("h1", "p1").await;
        assert!(cache.get_pod("h1", "p1").await.is_none());
        assert!(cache.get_pod("h1", "p2").await.is_some());
    }

    #[tokio::test]
    async fn pod_manifests_scoped_to_node() {
        let cache = NodeCache::new();
        cache.set_pod("h1", "p1", pod(state::RUNNING)).await;
        cache.set_pod("h2", "p2", pod(state::RUNNING)).await;

        let manifests = cache.pod_manifests("h1").await;
        assert_eq!(manifests.len(), 1);
        assert!(manifests.contains_key("p1"));
    }

    #[tokio::test]
    async fn clear_drops_node_entries_but_keeps_endpoints() {
        let cache = NodeCache::new();
        cache.set_pod("h1", "p1", pod(state::RUNNING)).await;
        cache
            .set_volume("h1", "v1", VolumeManifest::default())
            .await;
        cache.set_pod("h2", "p2", pod(state::RUNNING)).await;
        cache
            .set_endpoint("web", EndpointManifest::default())
            .await;

        cache.clear("h1").await;

        assert!(cache.get_pod("h1", "p1").await.is_none());
        assert!(cache.get_volume("h1", "v1").await.is_none());
        assert!(cache.get_pod("h2", "p2").await.is_some());
        assert!(cache.get_endpoint("web").await.is_some());
    }

    #[tokio::test]
    async fn getters_return_clones() {
        let cache = NodeCache::new();
        cache.set_endpoint("web", EndpointManifest::default()).await;

        let mut copy = cache.get_endpoint("web").await.unwrap();
        copy.ip = "10.0.0.9".to_string();

        // The cached entry is unaffected by mutation of the clone.
        assert!(cache.get_endpoint("web").await.unwrap().ip.is_empty());
    }
}
