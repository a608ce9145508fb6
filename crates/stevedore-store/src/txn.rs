//! Staged write transactions.
//!
//! Operations queued on a [`Txn`] are validated and applied inside a
//! single redb write transaction at [`Txn::commit`]. Any staged operation
//! failing aborts the whole transaction; no partial write is ever
//! observable. Committed changes are journaled by revision and broadcast
//! to live watchers after the commit lands.

use std::sync::Arc;

use redb::{Database, ReadableTable};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::event::{EventKind, RawEvent};
use crate::keys::under_prefix;
use crate::map_err;
use crate::store::{epoch_secs, Envelope};
use crate::tables::{EVENTS, KV, META, REVISION_KEY};

pub(crate) enum TxnOp {
    Create {
        key: String,
        value: serde_json::Value,
        ttl: u64,
    },
    Update {
        key: String,
        value: serde_json::Value,
        ttl: u64,
    },
    Put {
        key: String,
        value: serde_json::Value,
        ttl: u64,
    },
    Delete {
        key: String,
    },
    DeleteDir {
        prefix: String,
    },
}

/// A staged write transaction. Obtain via [`crate::KeyStore::begin`].
pub struct Txn {
    db: Arc<Database>,
    notify: broadcast::Sender<RawEvent>,
    ops: Vec<TxnOp>,
}

impl Txn {
    pub(crate) fn new(db: Arc<Database>, notify: broadcast::Sender<RawEvent>) -> Self {
        Self {
            db,
            notify,
            ops: Vec::new(),
        }
    }

    /// Stage a create. Fails at commit if the key already exists.
    /// `ttl` is in seconds; `0` means no expiration.
    pub fn create<T: Serialize>(&mut self, key: &str, value: &T, ttl: u64) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(map_err!(Serialize))?;
        self.ops.push(TxnOp::Create {
            key: key.to_string(),
            value,
            ttl,
        });
        Ok(())
    }

    /// Stage an update. Fails at commit if the key does not exist.
    pub fn update<T: Serialize>(&mut self, key: &str, value: &T, ttl: u64) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(map_err!(Serialize))?;
        self.ops.push(TxnOp::Update {
            key: key.to_string(),
            value,
            ttl,
        });
        Ok(())
    }

    /// Stage an upsert: create the key or replace its value, whichever
    /// applies at commit time. Never fails on (non-)existence, so two
    /// racing writers cannot make each other's commit abort.
    pub fn put<T: Serialize>(&mut self, key: &str, value: &T, ttl: u64) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(map_err!(Serialize))?;
        self.ops.push(TxnOp::Put {
            key: key.to_string(),
            value,
            ttl,
        });
        Ok(())
    }

    /// Stage a delete. Deleting an absent key is a no-op.
    pub fn delete(&mut self, key: &str) {
        self.ops.push(TxnOp::Delete {
            key: key.to_string(),
        });
    }

    /// Stage deletion of every key under `prefix`.
    pub fn delete_dir(&mut self, prefix: &str) {
        self.ops.push(TxnOp::DeleteDir {
            prefix: prefix.to_string(),
        });
    }

    /// Apply all staged operations atomically.
    ///
    /// Returns the store revision after the commit. On error the redb
    /// write transaction is dropped without committing, so none of the
    /// staged writes become visible.
    pub fn commit(self) -> StoreResult<u64> {
        let now = epoch_secs();
        let txn = self.db.begin_write().map_err(map_err!(Txn))?;
        let mut events: Vec<RawEvent> = Vec::new();
        let rev = {
            let mut kv = txn.open_table(KV).map_err(map_err!(Txn))?;
            let mut journal = txn.open_table(EVENTS).map_err(map_err!(Txn))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Txn))?;

            let mut rev = meta
                .get(REVISION_KEY)
                .map_err(map_err!(Txn))?
                .map(|g| g.value())
                .unwrap_or(0);

            for op in self.ops {
                match op {
                    TxnOp::Create { key, value, ttl } => {
                        let live = match kv.get(key.as_str()).map_err(map_err!(Txn))? {
                            Some(guard) => {
                                let env: Envelope = serde_json::from_slice(guard.value())
                                    .map_err(map_err!(Deserialize))?;
                                !env.expired(now)
                            }
                            None => false,
                        };
                        if live {
                            return Err(StoreError::Txn(format!(
                                "create: key already exists: {key}"
                            )));
                        }
                        let env = Envelope::new(value, ttl, now);
                        let raw = serde_json::to_vec(&env).map_err(map_err!(Serialize))?;
                        kv.insert(key.as_str(), raw.as_slice())
                            .map_err(map_err!(Txn))?;
                        rev += 1;
                        events.push(RawEvent {
                            kind: EventKind::Create,
                            key,
                            revision: rev,
                            data: Some(env.value),
                        });
                    }
                    TxnOp::Update { key, value, ttl } => {
                        let live = match kv.get(key.as_str()).map_err(map_err!(Txn))? {
                            Some(guard) => {
                                let env: Envelope = serde_json::from_slice(guard.value())
                                    .map_err(map_err!(Deserialize))?;
                                !env.expired(now)
                            }
                            None => false,
                        };
                        if !live {
                            return Err(StoreError::Txn(format!(
                                "update: key not found: {key}"
                            )));
                        }
                        let env = Envelope::new(value, ttl, now);
                        let raw = serde_json::to_vec(&env).map_err(map_err!(Serialize))?;
                        kv.insert(key.as_str(), raw.as_slice())
                            .map_err(map_err!(Txn))?;
                        rev += 1;
                        events.push(RawEvent {
                            kind: EventKind::Update,
                            key,
                            revision: rev,
                            data: Some(env.value),
                        });
                    }
                    TxnOp::Put { key, value, ttl } => {
                        let live = match kv.get(key.as_str()).map_err(map_err!(Txn))? {
                            Some(guard) => {
                                let env: Envelope = serde_json::from_slice(guard.value())
                                    .map_err(map_err!(Deserialize))?;
                                !env.expired(now)
                            }
                            None => false,
                        };
                        let env = Envelope::new(value, ttl, now);
                        let raw = serde_json::to_vec(&env).map_err(map_err!(Serialize))?;
                        kv.insert(key.as_str(), raw.as_slice())
                            .map_err(map_err!(Txn))?;
                        rev += 1;
                        events.push(RawEvent {
                            kind: if live {
                                EventKind::Update
                            } else {
                                EventKind::Create
                            },
                            key,
                            revision: rev,
                            data: Some(env.value),
                        });
                    }
                    TxnOp::Delete { key } => {
                        let prev = kv.remove(key.as_str()).map_err(map_err!(Txn))?;
                        if let Some(guard) = prev {
                            let env: Envelope = serde_json::from_slice(guard.value())
                                .map_err(map_err!(Deserialize))?;
                            rev += 1;
                            events.push(RawEvent {
                                kind: EventKind::Delete,
                                key,
                                revision: rev,
                                data: Some(env.value),
                            });
                        }
                    }
                    TxnOp::DeleteDir { prefix } => {
                        let keys: Vec<String> = kv
                            .iter()
                            .map_err(map_err!(Txn))?
                            .filter_map(|entry| {
                                let (k, _) = entry.ok()?;
                                let k = k.value().to_string();
                                under_prefix(&k, &prefix).then_some(k)
                            })
                            .collect();
                        for key in keys {
                            let prev = kv.remove(key.as_str()).map_err(map_err!(Txn))?;
                            if let Some(guard) = prev {
                                let env: Envelope = serde_json::from_slice(guard.value())
                                    .map_err(map_err!(Deserialize))?;
                                rev += 1;
                                events.push(RawEvent {
                                    kind: EventKind::Delete,
                                    key,
                                    revision: rev,
                                    data: Some(env.value),
                                });
                            }
                        }
                    }
                }
            }

            for event in &events {
                let raw = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
                journal
                    .insert(event.revision, raw.as_slice())
                    .map_err(map_err!(Txn))?;
            }
            meta.insert(REVISION_KEY, rev).map_err(map_err!(Txn))?;
            rev
        };
        txn.commit().map_err(map_err!(Txn))?;

        debug!(revision = rev, changes = events.len(), "transaction committed");
        // Fan out to live watchers; no receivers is fine.
        for event in events {
            let _ = self.notify.send(event);
        }
        Ok(rev)
    }
}
