//! KeyStore — redb-backed transactional KV with prefix watches.
//!
//! Values are JSON-serialized into redb's `&str -> &[u8]` column inside an
//! envelope carrying the optional TTL expiry. Every read scopes its own
//! redb transaction, which is released on every exit path by drop. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::event::RawEvent;
use crate::keys::under_prefix;
use crate::map_err;
use crate::tables::{EVENTS, KV, META, REVISION_KEY};
use crate::txn::Txn;

/// Capacity of the live-event fan-out channel. A subscriber that falls
/// further behind than this re-reads the journal instead of losing events.
const NOTIFY_CAPACITY: usize = 1024;

/// Stored value plus its optional absolute expiry.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Envelope {
    pub value: serde_json::Value,
    pub expires_at: Option<u64>,
}

impl Envelope {
    pub fn new(value: serde_json::Value, ttl: u64, now: u64) -> Self {
        Self {
            value,
            expires_at: (ttl > 0).then(|| now + ttl),
        }
    }

    pub fn expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Thread-safe key store backed by redb.
#[derive(Clone)]
pub struct KeyStore {
    db: Arc<Database>,
    notify: broadcast::Sender<RawEvent>,
}

impl KeyStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::wrap(db)?;
        debug!(?path, "key store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::wrap(db)?;
        debug!("in-memory key store opened");
        Ok(store)
    }

    fn wrap(db: Database) -> StoreResult<Self> {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        let store = Self {
            db: Arc::new(db),
            notify,
        };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Txn))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(KV).map_err(map_err!(Txn))?;
        txn.open_table(EVENTS).map_err(map_err!(Txn))?;
        txn.open_table(META).map_err(map_err!(Txn))?;
        txn.commit().map_err(map_err!(Txn))?;
        Ok(())
    }

    /// Get the value stored under `key`.
    ///
    /// Fails with [`StoreError::NotFound`] if the key is absent or its TTL
    /// has passed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<T> {
        let txn = self.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn.open_table(KV).map_err(map_err!(Storage))?;
        let guard = table
            .get(key)
            .map_err(map_err!(Storage))?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let env: Envelope =
            serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
        if env.expired(epoch_secs()) {
            return Err(StoreError::NotFound(key.to_string()));
        }
        serde_json::from_value(env.value).map_err(map_err!(Deserialize))
    }

    /// List all values under `prefix`, optionally narrowed by a regular
    /// expression over the full key. Absence is an empty vec, not an error.
    pub fn list<T: DeserializeOwned>(
        &self,
        prefix: &str,
        filter: Option<&Regex>,
    ) -> StoreResult<Vec<T>> {
        let now = epoch_secs();
        let txn = self.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn.open_table(KV).map_err(map_err!(Storage))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (key, value) = entry.map_err(map_err!(Storage))?;
            let key = key.value();
            if !under_prefix(key, prefix) {
                continue;
            }
            if let Some(re) = filter {
                if !re.is_match(key) {
                    continue;
                }
            }
            let env: Envelope =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if env.expired(now) {
                continue;
            }
            let item: T = serde_json::from_value(env.value).map_err(map_err!(Deserialize))?;
            results.push(item);
        }
        Ok(results)
    }

    /// Bulk-fetch all children under `prefix` into a mapping keyed by the
    /// remainder of the key path. Absence is an empty map, not an error.
    pub fn map<T: DeserializeOwned>(&self, prefix: &str) -> StoreResult<HashMap<String, T>> {
        let now = epoch_secs();
        let txn = self.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn.open_table(KV).map_err(map_err!(Storage))?;
        let mut results = HashMap::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (key, value) = entry.map_err(map_err!(Storage))?;
            let key = key.value();
            let Some(child) = key
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/'))
            else {
                continue;
            };
            let env: Envelope =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if env.expired(now) {
                continue;
            }
            let item: T = serde_json::from_value(env.value).map_err(map_err!(Deserialize))?;
            results.insert(child.to_string(), item);
        }
        Ok(results)
    }

    /// Open a staged write transaction.
    pub fn begin(&self) -> Txn {
        Txn::new(Arc::clone(&self.db), self.notify.clone())
    }

    /// The revision of the last committed change.
    pub fn current_revision(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn.open_table(META).map_err(map_err!(Storage))?;
        Ok(table
            .get(REVISION_KEY)
            .map_err(map_err!(Storage))?
            .map(|g| g.value())
            .unwrap_or(0))
    }

    /// Journaled events with revision greater than `after`, all prefixes.
    fn journal_after(&self, after: u64) -> StoreResult<Vec<RawEvent>> {
        let txn = self.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Storage))?;
        let mut events = Vec::new();
        for entry in table.range((after + 1)..).map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            let event: RawEvent =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            events.push(event);
        }
        Ok(events)
    }

    /// Drop journal entries with revision `<= up_to`, returning how many
    /// were removed. Watches resuming from a revision below the compaction
    /// point will not see the compacted changes; callers drive the policy
    /// and must only compact below every live resume point.
    pub fn compact(&self, up_to: u64) -> StoreResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Txn))?;
        let removed = {
            let mut table = txn.open_table(EVENTS).map_err(map_err!(Txn))?;
            let revisions: Vec<u64> = table
                .range(..=up_to)
                .map_err(map_err!(Txn))?
                .filter_map(|entry| entry.ok().map(|(k, _)| k.value()))
                .collect();
            for revision in &revisions {
                table.remove(revision).map_err(map_err!(Txn))?;
            }
            revisions.len() as u64
        };
        txn.commit().map_err(map_err!(Txn))?;
        debug!(up_to, removed, "journal compacted");
        Ok(removed)
    }

    /// Start a background subscription for every committed change under
    /// `prefix`, delivered to `tx` in revision order.
    ///
    /// With `from_revision: Some(rev)` the journal is replayed from
    /// `rev + 1` before live delivery; with `None` only changes committed
    /// after the subscription are delivered. Delivery awaits channel
    /// capacity — a slow consumer applies backpressure, events are never
    /// dropped. The task ends when the receiver is closed or the store's
    /// fan-out channel is gone.
    pub fn watch(
        &self,
        prefix: &str,
        tx: mpsc::Sender<RawEvent>,
        from_revision: Option<u64>,
    ) -> JoinHandle<()> {
        let store = self.clone();
        let prefix = prefix.to_string();
        // Capture the starting point before spawning: changes committed
        // between now and the task's subscription are covered by the
        // journal replay.
        let mut last = match from_revision {
            Some(rev) => rev,
            None => self.current_revision().unwrap_or(0),
        };
        tokio::spawn(async move {
            let mut sub = store.notify.subscribe();
            loop {
                // Journal replay: everything committed after `last`. The
                // journal is the ordering authority; `last` advances over
                // every revision so gaps in the live stream are detectable.
                match store.journal_after(last) {
                    Ok(events) => {
                        for event in events {
                            last = event.revision;
                            if !under_prefix(&event.key, &prefix) {
                                continue;
                            }
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(%prefix, error = %e, "watch journal replay failed");
                    }
                }
                // Live delivery until the subscriber lags or skips a
                // revision, then replay again. Revisions are dense, so a
                // gap means the broadcast arrived out of commit order and
                // the missing change is only safe to read from the journal.
                loop {
                    match sub.recv().await {
                        Ok(event) => {
                            if event.revision <= last {
                                continue;
                            }
                            if event.revision > last + 1 {
                                break;
                            }
                            last = event.revision;
                            if under_prefix(&event.key, &prefix)
                                && tx.send(event).await.is_err()
                            {
                                return;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(%prefix, skipped, "watch lagged, replaying journal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        })
    }
}
