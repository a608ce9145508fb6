//! Raw-to-typed watch event translation shared by the models.

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use stevedore_store::{EventKind, KeyStore};
use stevedore_types::{EventAction, ManifestEvent};

use crate::paths::EventScope;

/// Buffer between the raw store watch and the translation task.
const RAW_BUFFER: usize = 64;

/// Subscribe to raw store events under `prefix` and forward them to `tx`
/// as typed manifest events.
///
/// `parse` extracts the entity identity from the key path and doubles as
/// the kind filter: keys it rejects are dropped. A payload that fails to
/// decode is logged and skipped; it never terminates the stream. The task
/// ends when either side of the channel pair closes.
pub(crate) fn translate<T, P>(
    store: &KeyStore,
    prefix: String,
    parse: P,
    tx: mpsc::Sender<ManifestEvent<T>>,
    from_revision: Option<u64>,
) -> JoinHandle<()>
where
    T: DeserializeOwned + Send + 'static,
    P: Fn(&str) -> Option<EventScope> + Send + 'static,
{
    let (raw_tx, mut raw_rx) = mpsc::channel(RAW_BUFFER);
    let raw_handle = store.watch(&prefix, raw_tx, from_revision);

    tokio::spawn(async move {
        while let Some(raw) = raw_rx.recv().await {
            let Some(scope) = parse(&raw.key) else {
                continue;
            };
            let action = match raw.kind {
                EventKind::Delete => EventAction::Remove,
                EventKind::Create | EventKind::Update => EventAction::Upsert,
            };
            let data = match raw.data {
                Some(value) => match serde_json::from_value::<T>(value) {
                    Ok(data) => Some(data),
                    Err(e) => {
                        warn!(key = %raw.key, error = %e, "skipping undecodable manifest payload");
                        continue;
                    }
                },
                None => None,
            };
            let event = ManifestEvent {
                action,
                name: scope.name,
                node: scope.node,
                self_link: scope.self_link,
                revision: raw.revision,
                data,
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
        raw_handle.abort();
    })
}
