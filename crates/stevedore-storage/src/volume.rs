//! Volume manifest model — node-scoped volume manifests and their watch.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use stevedore_store::{KeyBuilder, KeyStore, StoreError};
use stevedore_types::{ManifestEvent, VolumeManifest};

use crate::error::StorageResult;
use crate::paths::{self, parse_node_scoped};
use crate::watch;

/// Typed accessor for volume manifests.
#[derive(Clone)]
pub struct VolumeModel {
    store: KeyStore,
    keys: KeyBuilder,
}

impl VolumeModel {
    pub fn new(store: KeyStore, namespace: &str) -> Self {
        Self {
            store,
            keys: KeyBuilder::new(namespace),
        }
    }

    fn manifest_key(&self, hostname: &str, self_link: &str) -> String {
        self.keys.key(&[
            paths::MANIFEST,
            paths::NODE,
            hostname,
            paths::VOLUME,
            self_link,
        ])
    }

    /// Get one volume manifest, `Ok(None)` when absent.
    pub fn manifest_get(
        &self,
        hostname: &str,
        self_link: &str,
    ) -> StorageResult<Option<VolumeManifest>> {
        match self.store.get(&self.manifest_key(hostname, self_link)) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All volume manifests targeted at one node, keyed by self-link.
    pub fn manifest_map(&self, hostname: &str) -> StorageResult<HashMap<String, VolumeManifest>> {
        let prefix = self
            .keys
            .key(&[paths::MANIFEST, paths::NODE, hostname, paths::VOLUME]);
        Ok(self.store.map(&prefix)?)
    }

    /// Create or replace the manifest for one volume on one node.
    pub fn manifest_set(
        &self,
        hostname: &str,
        self_link: &str,
        manifest: &VolumeManifest,
    ) -> StorageResult<()> {
        let mut txn = self.store.begin();
        txn.put(&self.manifest_key(hostname, self_link), manifest, 0)?;
        txn.commit()?;

        debug!(%hostname, %self_link, state = %manifest.state, "volume manifest set");
        Ok(())
    }

    /// Delete the manifest for one volume on one node.
    pub fn manifest_remove(&self, hostname: &str, self_link: &str) -> StorageResult<()> {
        let mut txn = self.store.begin();
        txn.delete(&self.manifest_key(hostname, self_link));
        txn.commit()?;

        debug!(%hostname, %self_link, "volume manifest removed");
        Ok(())
    }

    /// Watch volume manifest changes across all nodes.
    pub fn manifest_watch(
        &self,
        tx: mpsc::Sender<ManifestEvent<VolumeManifest>>,
        from_revision: Option<u64>,
    ) -> JoinHandle<()> {
        let prefix = self.keys.key(&[paths::MANIFEST, paths::NODE]);
        watch::translate(
            &self.store,
            prefix,
            |key| parse_node_scoped(key, paths::VOLUME),
            tx,
            from_revision,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_types::state;

    fn model() -> VolumeModel {
        VolumeModel::new(KeyStore::open_in_memory().unwrap(), "cluster")
    }

    fn manifest(path: &str) -> VolumeManifest {
        VolumeManifest {
            state: state::CREATED.to_string(),
            path: path.to_string(),
            capacity_mb: 512,
            updated: 0,
        }
    }

    #[test]
    fn set_then_get() {
        let model = model();
        model
            .manifest_set("h1", "v1", &manifest("/var/lib/vol-1"))
            .unwrap();
        let got = model.manifest_get("h1", "v1").unwrap().unwrap();
        assert_eq!(got.path, "/var/lib/vol-1");
        assert_eq!(got.capacity_mb, 512);
    }

    #[test]
    fn get_absent_is_none() {
        let model = model();
        assert!(model.manifest_get("h1", "missing").unwrap().is_none());
    }

    #[test]
    fn map_is_scoped_to_one_node() {
        let model = model();
        model.manifest_set("h1", "v1", &manifest("/a")).unwrap();
        model.manifest_set("h2", "v2", &manifest("/b")).unwrap();

        let manifests = model.manifest_map("h1").unwrap();
        assert_eq!(manifests.len(), 1);
        assert!(manifests.contains_key("v1"));
    }

    #[tokio::test]
    async fn watch_sees_upsert_and_remove() {
        let model = model();
        let (tx, mut rx) = mpsc::channel(16);
        let handle = model.manifest_watch(tx, None);

        model.manifest_set("h1", "v1", &manifest("/a")).unwrap();
        let upsert = rx.recv().await.unwrap();
        assert!(!upsert.is_remove());
        assert_eq!(upsert.node.as_deref(), Some("h1"));
        assert_eq!(upsert.data.unwrap().path, "/a");

        model.manifest_remove("h1", "v1").unwrap();
        let removed = rx.recv().await.unwrap();
        assert!(removed.is_remove());
        assert_eq!(removed.self_link, "v1");

        handle.abort();
    }
}
