//! Subnet state model — overlay subnet allocations keyed by CIDR.
//!
//! The CIDR's `/` cannot appear inside a key segment, so it is stored
//! encoded and decoded back on the way out of the watch.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use stevedore_store::{KeyBuilder, KeyStore, StoreError};
use stevedore_types::{ManifestEvent, NetworkState};

use crate::error::StorageResult;
use crate::paths::{self, decode_cidr, encode_cidr, parse_named};
use crate::watch;

/// Typed accessor for subnet allocation state.
#[derive(Clone)]
pub struct SubnetModel {
    store: KeyStore,
    keys: KeyBuilder,
}

impl SubnetModel {
    pub fn new(store: KeyStore, namespace: &str) -> Self {
        Self {
            store,
            keys: KeyBuilder::new(namespace),
        }
    }

    fn manifest_key(&self, cidr: &str) -> String {
        self.keys
            .key(&[paths::MANIFEST, paths::SUBNET, &encode_cidr(cidr)])
    }

    /// Get one subnet's state, `Ok(None)` when absent.
    pub fn manifest_get(&self, cidr: &str) -> StorageResult<Option<NetworkState>> {
        match self.store.get(&self.manifest_key(cidr)) {
            Ok(state) => Ok(Some(state)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All subnet states, keyed by decoded CIDR.
    pub fn manifest_map(&self) -> StorageResult<HashMap<String, NetworkState>> {
        let prefix = self.keys.key(&[paths::MANIFEST, paths::SUBNET]);
        let raw: HashMap<String, NetworkState> = self.store.map(&prefix)?;
        Ok(raw
            .into_iter()
            .map(|(segment, state)| (decode_cidr(&segment), state))
            .collect())
    }

    /// Create or replace one subnet's state.
    pub fn manifest_set(&self, cidr: &str, state: &NetworkState) -> StorageResult<()> {
        let mut txn = self.store.begin();
        txn.put(&self.manifest_key(cidr), state, 0)?;
        txn.commit()?;

        debug!(%cidr, state = %state.state, "subnet state set");
        Ok(())
    }

    /// Delete one subnet's state.
    pub fn manifest_remove(&self, cidr: &str) -> StorageResult<()> {
        let mut txn = self.store.begin();
        txn.delete(&self.manifest_key(cidr));
        txn.commit()?;

        debug!(%cidr, "subnet state removed");
        Ok(())
    }

    /// Watch subnet state changes. Event names carry the decoded CIDR.
    pub fn manifest_watch(
        &self,
        tx: mpsc::Sender<ManifestEvent<NetworkState>>,
        from_revision: Option<u64>,
    ) -> JoinHandle<()> {
        let prefix = self.keys.key(&[paths::MANIFEST, paths::SUBNET]);
        watch::translate(
            &self.store,
            prefix,
            |key| {
                parse_named(key, paths::SUBNET).map(|mut scope| {
                    scope.name = decode_cidr(&scope.name);
                    scope.self_link = scope.name.clone();
                    scope
                })
            },
            tx,
            from_revision,
        )
    }
}
