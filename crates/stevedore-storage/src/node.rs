//! Node storage model — node registration, pod attachment, status watch.
//!
//! All multi-key mutations (attach/detach a pod, touch node metadata)
//! are staged on one store transaction so they land atomically or not at
//! all.

use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use stevedore_store::{KeyBuilder, KeyStore, StoreError};
use stevedore_types::{ManifestEvent, Node, NodeMeta, NodeStatus, PodNodeSpec};

use crate::error::{StorageError, StorageResult};
use crate::paths::{self, parse_node_status};
use crate::watch;

/// Selects `node/<hostname>/meta` records during listing.
const META_FILTER: &str = r"node/[^/]+/meta$";

/// Typed accessor for node records.
#[derive(Clone)]
pub struct NodeModel {
    store: KeyStore,
    keys: KeyBuilder,
}

impl NodeModel {
    pub fn new(store: KeyStore, namespace: &str) -> Self {
        Self {
            store,
            keys: KeyBuilder::new(namespace),
        }
    }

    fn meta_key(&self, hostname: &str) -> String {
        self.keys.key(&[paths::NODE, hostname, paths::META])
    }

    fn status_key(&self, hostname: &str) -> String {
        self.keys.key(&[paths::NODE, hostname, paths::STATUS])
    }

    fn pod_key(&self, hostname: &str, self_link: &str) -> String {
        self.keys.key(&[paths::NODE, hostname, paths::POD, self_link])
    }

    /// List all registered nodes (metadata only).
    pub fn list(&self) -> StorageResult<Vec<Node>> {
        let filter = Regex::new(META_FILTER).map_err(|e| StorageError::Filter(e.to_string()))?;
        let prefix = self.keys.key(&[paths::NODE]);
        let metas: Vec<NodeMeta> = self.store.list(&prefix, Some(&filter))?;
        Ok(metas
            .into_iter()
            .map(|meta| Node {
                meta,
                ..Node::default()
            })
            .collect())
    }

    /// Get one node with its status and attached pod specs.
    ///
    /// Returns `Ok(None)` when the node is not registered.
    pub fn get(&self, hostname: &str) -> StorageResult<Option<Node>> {
        let meta: NodeMeta = match self.store.get(&self.meta_key(hostname)) {
            Ok(meta) => meta,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let status: NodeStatus = match self.store.get(&self.status_key(hostname)) {
            Ok(status) => status,
            Err(StoreError::NotFound(_)) => NodeStatus::default(),
            Err(e) => return Err(e.into()),
        };

        let pod_prefix = self.keys.key(&[paths::NODE, hostname, paths::POD]);
        let pods = self.store.map::<PodNodeSpec>(&pod_prefix)?;

        let mut node = Node {
            meta,
            status,
            ..Node::default()
        };
        node.spec.pods = pods.into_values().collect();
        Ok(Some(node))
    }

    /// Register a new node. Generates the node ID and stamps timestamps;
    /// the node starts online.
    pub fn insert(&self, meta: &NodeMeta) -> StorageResult<Node> {
        let now = now_secs();
        let mut node = Node::default();
        node.meta = meta.clone();
        node.meta.id = generate_node_id(&meta.hostname);
        node.meta.labels.insert("tier".to_string(), "node".to_string());
        node.meta.created = now;
        node.meta.updated = now;
        node.status = NodeStatus { online: true };

        let mut txn = self.store.begin();
        txn.create(&self.meta_key(&node.meta.hostname), &node.meta, 0)?;
        txn.create(&self.status_key(&node.meta.hostname), &node.status, 0)?;
        txn.commit()?;

        debug!(hostname = %node.meta.hostname, id = %node.meta.id, "node registered");
        Ok(node)
    }

    /// Update node metadata.
    pub fn update_meta(&self, meta: &NodeMeta) -> StorageResult<()> {
        let mut meta = meta.clone();
        meta.updated = now_secs();

        let mut txn = self.store.begin();
        txn.update(&self.meta_key(&meta.hostname), &meta, 0)?;
        txn.commit()?;
        Ok(())
    }

    /// Set a node's online status.
    pub fn set_status(&self, hostname: &str, online: bool) -> StorageResult<()> {
        let mut txn = self.store.begin();
        txn.update(&self.status_key(hostname), &NodeStatus { online }, 0)?;
        txn.commit()?;
        Ok(())
    }

    /// Attach a pod spec to a node. Touches the node metadata and creates
    /// the pod key in one transaction.
    pub fn insert_pod(&self, meta: &NodeMeta, pod: &PodNodeSpec) -> StorageResult<()> {
        let mut meta = meta.clone();
        meta.updated = now_secs();

        let mut txn = self.store.begin();
        txn.update(&self.meta_key(&meta.hostname), &meta, 0)?;
        txn.create(&self.pod_key(&meta.hostname, &pod.meta.self_link), pod, 0)?;
        txn.commit()?;

        debug!(hostname = %meta.hostname, pod = %pod.meta.self_link, "pod attached to node");
        Ok(())
    }

    /// Update an attached pod spec.
    pub fn update_pod(&self, meta: &NodeMeta, pod: &PodNodeSpec) -> StorageResult<()> {
        let mut meta = meta.clone();
        meta.updated = now_secs();

        let mut txn = self.store.begin();
        txn.update(&self.meta_key(&meta.hostname), &meta, 0)?;
        txn.update(&self.pod_key(&meta.hostname, &pod.meta.self_link), pod, 0)?;
        txn.commit()?;
        Ok(())
    }

    /// Detach a pod spec from a node.
    pub fn remove_pod(&self, meta: &NodeMeta, pod: &PodNodeSpec) -> StorageResult<()> {
        let mut meta = meta.clone();
        meta.updated = now_secs();

        let mut txn = self.store.begin();
        txn.update(&self.meta_key(&meta.hostname), &meta, 0)?;
        txn.delete(&self.pod_key(&meta.hostname, &pod.meta.self_link));
        txn.commit()?;

        debug!(hostname = %meta.hostname, pod = %pod.meta.self_link, "pod detached from node");
        Ok(())
    }

    /// Remove a node and its whole key subtree.
    pub fn remove(&self, hostname: &str) -> StorageResult<()> {
        let mut txn = self.store.begin();
        txn.delete_dir(&self.keys.key(&[paths::NODE, hostname]));
        txn.commit()?;

        debug!(%hostname, "node removed");
        Ok(())
    }

    /// Watch node status changes. Events carry the hostname in `name`;
    /// a removal event means the node's subtree was deleted.
    pub fn watch_status(
        &self,
        tx: mpsc::Sender<ManifestEvent<NodeStatus>>,
        from_revision: Option<u64>,
    ) -> JoinHandle<()> {
        let prefix = self.keys.key(&[paths::NODE]);
        watch::translate(&self.store, prefix, parse_node_status, tx, from_revision)
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Generate a deterministic-format node ID from the hostname.
fn generate_node_id(hostname: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    hostname.hash(&mut hasher);
    now_secs().hash(&mut hasher);
    format!("node-{:08x}", hasher.finish() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_types::{PodMeta, PodSpec};

    fn model() -> NodeModel {
        NodeModel::new(KeyStore::open_in_memory().unwrap(), "cluster")
    }

    fn meta(hostname: &str) -> NodeMeta {
        NodeMeta {
            hostname: hostname.to_string(),
            ..NodeMeta::default()
        }
    }

    fn pod_spec(link: &str) -> PodNodeSpec {
        PodNodeSpec {
            meta: PodMeta {
                name: link.to_string(),
                self_link: link.to_string(),
                ..PodMeta::default()
            },
            spec: PodSpec::default(),
        }
    }

    #[test]
    fn insert_and_get() {
        let model = model();
        let node = model.insert(&meta("h1")).unwrap();
        assert!(node.meta.id.starts_with("node-"));
        assert_eq!(node.meta.labels.get("tier").unwrap(), "node");

        let got = model.get("h1").unwrap().unwrap();
        assert_eq!(got.meta.hostname, "h1");
        assert!(got.status.online);
        assert!(got.spec.pods.is_empty());
    }

    #[test]
    fn get_absent_node_is_none_not_error() {
        let model = model();
        assert!(model.get("missing").unwrap().is_none());
    }

    #[test]
    fn list_returns_meta_records_only() {
        let model = model();
        model.insert(&meta("h1")).unwrap();
        model.insert(&meta("h2")).unwrap();
        model
            .insert_pod(&model.get("h1").unwrap().unwrap().meta, &pod_spec("p1"))
            .unwrap();

        let nodes = model.list().unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn insert_pod_shows_up_in_get() {
        let model = model();
        let node = model.insert(&meta("h1")).unwrap();
        model.insert_pod(&node.meta, &pod_spec("p1")).unwrap();
        model.insert_pod(&node.meta, &pod_spec("p2")).unwrap();

        let got = model.get("h1").unwrap().unwrap();
        assert_eq!(got.spec.pods.len(), 2);
        // The meta update stamp moved forward with the attach.
        assert!(got.meta.updated >= node.meta.updated);
    }

    #[test]
    fn insert_pod_without_node_leaves_nothing_behind() {
        let model = model();
        let err = model.insert_pod(&meta("ghost"), &pod_spec("p1"));
        assert!(err.is_err());
        // The pod key from the aborted transaction must not exist.
        assert!(model.get("ghost").unwrap().is_none());
    }

    #[test]
    fn remove_pod_detaches() {
        let model = model();
        let node = model.insert(&meta("h1")).unwrap();
        model.insert_pod(&node.meta, &pod_spec("p1")).unwrap();
        model.remove_pod(&node.meta, &pod_spec("p1")).unwrap();

        let got = model.get("h1").unwrap().unwrap();
        assert!(got.spec.pods.is_empty());
    }

    #[test]
    fn remove_deletes_subtree() {
        let model = model();
        let node = model.insert(&meta("h1")).unwrap();
        model.insert_pod(&node.meta, &pod_spec("p1")).unwrap();

        model.remove("h1").unwrap();
        assert!(model.get("h1").unwrap().is_none());
    }

    #[test]
    fn set_status_flips_online() {
        let model = model();
        model.insert(&meta("h1")).unwrap();
        model.set_status("h1", false).unwrap();
        assert!(!model.get("h1").unwrap().unwrap().status.online);
    }

    #[tokio::test]
    async fn watch_status_sees_offline_and_removal() {
        let model = model();
        model.insert(&meta("h1")).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let handle = model.watch_status(tx, None);

        model.set_status("h1", false).unwrap();
        let offline = rx.recv().await.unwrap();
        assert_eq!(offline.name, "h1");
        assert!(!offline.is_remove());
        assert!(!offline.data.unwrap().online);

        model.remove("h1").unwrap();
        let removed = rx.recv().await.unwrap();
        assert_eq!(removed.name, "h1");
        assert!(removed.is_remove());

        handle.abort();
    }
}
