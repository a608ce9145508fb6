//! Pod manifest model — node-scoped pod manifests and their watch.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use stevedore_store::{KeyBuilder, KeyStore, StoreError};
use stevedore_types::{ManifestEvent, PodManifest};

use crate::error::StorageResult;
use crate::paths::{self, parse_node_scoped};
use crate::watch;

/// Typed accessor for pod manifests.
#[derive(Clone)]
pub struct PodModel {
    store: KeyStore,
    keys: KeyBuilder,
}

impl PodModel {
    pub fn new(store: KeyStore, namespace: &str) -> Self {
        Self {
            store,
            keys: KeyBuilder::new(namespace),
        }
    }

    fn manifest_key(&self, hostname: &str, self_link: &str) -> String {
        self.keys
            .key(&[paths::MANIFEST, paths::NODE, hostname, paths::POD, self_link])
    }

    /// Get one pod manifest, `Ok(None)` when absent.
    pub fn manifest_get(
        &self,
        hostname: &str,
        self_link: &str,
    ) -> StorageResult<Option<PodManifest>> {
        match self.store.get(&self.manifest_key(hostname, self_link)) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All pod manifests targeted at one node, keyed by self-link.
    pub fn manifest_map(&self, hostname: &str) -> StorageResult<HashMap<String, PodManifest>> {
        let prefix = self
            .keys
            .key(&[paths::MANIFEST, paths::NODE, hostname, paths::POD]);
        Ok(self.store.map(&prefix)?)
    }

    /// Create or replace the manifest for one pod on one node.
    pub fn manifest_set(
        &self,
        hostname: &str,
        self_link: &str,
        manifest: &PodManifest,
    ) -> StorageResult<()> {
        let mut txn = self.store.begin();
        txn.put(&self.manifest_key(hostname, self_link), manifest, 0)?;
        txn.commit()?;

        debug!(%hostname, %self_link, state = %manifest.state, "pod manifest set");
        Ok(())
    }

    /// Delete the manifest for one pod on one node.
    pub fn manifest_remove(&self, hostname: &str, self_link: &str) -> StorageResult<()> {
        let mut txn = self.store.begin();
        txn.delete(&self.manifest_key(hostname, self_link));
        txn.commit()?;

        debug!(%hostname, %self_link, "pod manifest removed");
        Ok(())
    }

    /// Watch pod manifest changes across all nodes.
    pub fn manifest_watch(
        &self,
        tx: mpsc::Sender<ManifestEvent<PodManifest>>,
        from_revision: Option<u64>,
    ) -> JoinHandle<()> {
        let prefix = self.keys.key(&[paths::MANIFEST, paths::NODE]);
        watch::translate(
            &self.store,
            prefix,
            |key| parse_node_scoped(key, paths::POD),
            tx,
            from_revision,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_types::state;

    fn model() -> PodModel {
        PodModel::new(KeyStore::open_in_memory().unwrap(), "cluster")
    }

    fn manifest(state: &str) -> PodManifest {
        PodManifest {
            state: state.to_string(),
            ..PodManifest::default()
        }
    }

    #[test]
    fn set_then_get() {
        let model = model();
        model
            .manifest_set("h1", "p1", &manifest(state::CREATED))
            .unwrap();
        let got = model.manifest_get("h1", "p1").unwrap().unwrap();
        assert_eq!(got.state, state::CREATED);
    }

    #[test]
    fn get_absent_is_none() {
        let model = model();
        assert!(model.manifest_get("h1", "missing").unwrap().is_none());
    }

    #[test]
    fn set_replaces_existing() {
        let model = model();
        model
            .manifest_set("h1", "p1", &manifest(state::CREATED))
            .unwrap();
        model
            .manifest_set("h1", "p1", &manifest(state::RUNNING))
            .unwrap();
        let got = model.manifest_get("h1", "p1").unwrap().unwrap();
        assert_eq!(got.state, state::RUNNING);
    }

    #[test]
    fn map_is_scoped_to_one_node() {
        let model = model();
        model
            .manifest_set("h1", "p1", &manifest(state::RUNNING))
            .unwrap();
        model
            .manifest_set("h1", "p2", &manifest(state::CREATED))
            .unwrap();
        model
            .manifest_set("h2", "p3", &manifest(state::RUNNING))
            .unwrap();

        let manifests = model.manifest_map("h1").unwrap();
        assert_eq!(manifests.len(), 2);
        assert!(manifests.contains_key("p1"));
        assert!(manifests.contains_key("p2"));
    }

    #[tokio::test]
    async fn watch_sees_upsert_and_remove() {
        let model = model();
        let (tx, mut rx) = mpsc::channel(16);
        let handle = model.manifest_watch(tx, None);

        model
            .manifest_set("h1", "p1", &manifest(state::RUNNING))
            .unwrap();
        let upsert = rx.recv().await.unwrap();
        assert!(!upsert.is_remove());
        assert_eq!(upsert.node.as_deref(), Some("h1"));
        assert_eq!(upsert.self_link, "p1");
        assert_eq!(upsert.data.unwrap().state, state::RUNNING);

        model.manifest_remove("h1", "p1").unwrap();
        let removed = rx.recv().await.unwrap();
        assert!(removed.is_remove());
        assert_eq!(removed.self_link, "p1");
        // Removal events carry the last stored manifest.
        assert_eq!(removed.data.unwrap().state, state::RUNNING);

        handle.abort();
    }

    #[tokio::test]
    async fn watch_ignores_other_manifest_kinds() {
        let model = model();
        let volumes = crate::volume::VolumeModel::new(
            model.store.clone(),
            "cluster",
        );

        let (tx, mut rx) = mpsc::channel(16);
        let handle = model.manifest_watch(tx, None);

        volumes
            .manifest_set("h1", "v1", &stevedore_types::VolumeManifest::default())
            .unwrap();
        model
            .manifest_set("h1", "p1", &manifest(state::CREATED))
            .unwrap();

        // The volume write under the same node prefix is filtered out.
        let event = rx.recv().await.unwrap();
        assert_eq!(event.self_link, "p1");

        handle.abort();
    }
}
