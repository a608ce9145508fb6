//! Endpoint manifest model — name-scoped service endpoints and their watch.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use stevedore_store::{KeyBuilder, KeyStore, StoreError};
use stevedore_types::{EndpointManifest, ManifestEvent};

use crate::error::StorageResult;
use crate::paths::{self, parse_named};
use crate::watch;

/// Typed accessor for endpoint manifests.
#[derive(Clone)]
pub struct EndpointModel {
    store: KeyStore,
    keys: KeyBuilder,
}

impl EndpointModel {
    pub fn new(store: KeyStore, namespace: &str) -> Self {
        Self {
            store,
            keys: KeyBuilder::new(namespace),
        }
    }

    fn manifest_key(&self, name: &str) -> String {
        self.keys.key(&[paths::MANIFEST, paths::ENDPOINT, name])
    }

    /// Get one endpoint manifest, `Ok(None)` when absent.
    pub fn manifest_get(&self, name: &str) -> StorageResult<Option<EndpointManifest>> {
        match self.store.get(&self.manifest_key(name)) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All endpoint manifests, keyed by name.
    pub fn manifest_map(&self) -> StorageResult<HashMap<String, EndpointManifest>> {
        let prefix = self.keys.key(&[paths::MANIFEST, paths::ENDPOINT]);
        Ok(self.store.map(&prefix)?)
    }

    /// Create or replace one endpoint manifest.
    pub fn manifest_set(&self, name: &str, manifest: &EndpointManifest) -> StorageResult<()> {
        let mut txn = self.store.begin();
        txn.put(&self.manifest_key(name), manifest, 0)?;
        txn.commit()?;

        debug!(%name, ip = %manifest.ip, "endpoint manifest set");
        Ok(())
    }

    /// Delete one endpoint manifest.
    pub fn manifest_remove(&self, name: &str) -> StorageResult<()> {
        let mut txn = self.store.begin();
        txn.delete(&self.manifest_key(name));
        txn.commit()?;

        debug!(%name, "endpoint manifest removed");
        Ok(())
    }

    /// Watch endpoint manifest changes.
    pub fn manifest_watch(
        &self,
        tx: mpsc::Sender<ManifestEvent<EndpointManifest>>,
        from_revision: Option<u64>,
    ) -> JoinHandle<()> {
        let prefix = self.keys.key(&[paths::MANIFEST, paths::ENDPOINT]);
        watch::translate(
            &self.store,
            prefix,
            |key| parse_named(key, paths::ENDPOINT),
            tx,
            from_revision,
        )
    }
}
