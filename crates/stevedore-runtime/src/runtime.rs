//! Watch loops folding manifest events into the caches.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use stevedore_cache::{NodeCache, SubnetCache};
use stevedore_store::KeyStore;
use stevedore_storage::{EndpointModel, NodeModel, PodModel, SubnetModel, VolumeModel};
use stevedore_types::{
    EndpointManifest, EventAction, ManifestEvent, NetworkState, NodeStatus, PodManifest,
    VolumeManifest,
};

use crate::backoff::Backoff;

/// Buffer between a model watch and its loop.
const EVENT_BUFFER: usize = 64;

/// The reconciliation runtime. One instance owns the watch loops for
/// every manifest kind and keeps the shared caches current.
pub struct Runtime {
    store: KeyStore,
    nodes: NodeModel,
    pods: PodModel,
    volumes: VolumeModel,
    endpoints: EndpointModel,
    subnets_model: SubnetModel,
    cache: Arc<NodeCache>,
    subnets: Arc<SubnetCache>,
}

/// Handle to a started runtime: signals shutdown and joins the loops.
pub struct RuntimeHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl RuntimeHandle {
    /// Signal every loop to stop and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("runtime stopped");
    }
}

impl Runtime {
    pub fn new(
        store: KeyStore,
        namespace: &str,
        cache: Arc<NodeCache>,
        subnets: Arc<SubnetCache>,
    ) -> Self {
        Self {
            nodes: NodeModel::new(store.clone(), namespace),
            pods: PodModel::new(store.clone(), namespace),
            volumes: VolumeModel::new(store.clone(), namespace),
            endpoints: EndpointModel::new(store.clone(), namespace),
            subnets_model: SubnetModel::new(store.clone(), namespace),
            store,
            cache,
            subnets,
        }
    }

    /// Spawn the five watch loops and return the handle controlling them.
    ///
    /// The starting revision is captured here, before any loop task runs,
    /// so every change committed after `start` returns is reconciled.
    pub fn start(&self) -> RuntimeHandle {
        let (shutdown, rx) = watch::channel(false);
        let from = Some(self.store.current_revision().unwrap_or(0));
        let mut handles = Vec::new();

        {
            let model = self.pods.clone();
            let cache = Arc::clone(&self.cache);
            handles.push(tokio::spawn(supervise(
                "pod",
                rx.clone(),
                from,
                move |tx, rev| model.manifest_watch(tx, rev),
                move |ev| {
                    let cache = Arc::clone(&cache);
                    async move { apply_pod_event(&cache, ev).await }
                },
            )));
        }

        {
            let model = self.volumes.clone();
            let cache = Arc::clone(&self.cache);
            handles.push(tokio::spawn(supervise(
                "volume",
                rx.clone(),
                from,
                move |tx, rev| model.manifest_watch(tx, rev),
                move |ev| {
                    let cache = Arc::clone(&cache);
                    async move { apply_volume_event(&cache, ev).await }
                },
            )));
        }

        {
            let model = self.endpoints.clone();
            let cache = Arc::clone(&self.cache);
            handles.push(tokio::spawn(supervise(
                "endpoint",
                rx.clone(),
                from,
                move |tx, rev| model.manifest_watch(tx, rev),
                move |ev| {
                    let cache = Arc::clone(&cache);
                    async move { apply_endpoint_event(&cache, ev).await }
                },
            )));
        }

        {
            let model = self.subnets_model.clone();
            let subnets = Arc::clone(&self.subnets);
            handles.push(tokio::spawn(supervise(
                "subnet",
                rx.clone(),
                from,
                move |tx, rev| model.manifest_watch(tx, rev),
                move |ev| {
                    let subnets = Arc::clone(&subnets);
                    async move { apply_subnet_event(&subnets, ev).await }
                },
            )));
        }

        {
            let model = self.nodes.clone();
            let cache = Arc::clone(&self.cache);
            handles.push(tokio::spawn(supervise(
                "node",
                rx,
                from,
                move |tx, rev| model.watch_status(tx, rev),
                move |ev| {
                    let cache = Arc::clone(&cache);
                    async move { apply_node_event(&cache, ev).await }
                },
            )));
        }

        info!("runtime started");
        RuntimeHandle { shutdown, handles }
    }
}

// Events without a payload mutate nothing, removal included: a change
// whose data cannot be read is skipped, never turned into a deletion.

async fn apply_pod_event(cache: &NodeCache, ev: ManifestEvent<PodManifest>) {
    let ManifestEvent {
        action,
        node,
        self_link,
        data,
        ..
    } = ev;
    let Some(node) = node else { return };
    let Some(manifest) = data else { return };
    match action {
        EventAction::Remove => cache.del_pod(&node, &self_link).await,
        EventAction::Upsert => cache.set_pod(&node, &self_link, manifest).await,
    }
}

async fn apply_volume_event(cache: &NodeCache, ev: ManifestEvent<VolumeManifest>) {
    let ManifestEvent {
        action,
        node,
        self_link,
        data,
        ..
    } = ev;
    let Some(node) = node else { return };
    let Some(manifest) = data else { return };
    match action {
        EventAction::Remove => cache.del_volume(&node, &self_link).await,
        EventAction::Upsert => cache.set_volume(&node, &self_link, manifest).await,
    }
}

async fn apply_endpoint_event(cache: &NodeCache, ev: ManifestEvent<EndpointManifest>) {
    let ManifestEvent {
        action, name, data, ..
    } = ev;
    let Some(mut manifest) = data else { return };
    match action {
        EventAction::Remove => {
            // A removed endpoint stays cached as a destroy tombstone so
            // consumers can tear it down.
            manifest.set_destroy();
            cache.set_endpoint(&name, manifest).await;
        }
        EventAction::Upsert => cache.set_endpoint(&name, manifest).await,
    }
}

async fn apply_subnet_event(subnets: &SubnetCache, ev: ManifestEvent<NetworkState>) {
    let ManifestEvent {
        action, name, data, ..
    } = ev;
    let Some(mut state) = data else { return };
    match action {
        EventAction::Remove => {
            state.set_destroy();
            subnets.set_subnet(&name, state).await;
        }
        EventAction::Upsert => subnets.set_subnet(&name, state).await,
    }
}

async fn apply_node_event(cache: &NodeCache, ev: ManifestEvent<NodeStatus>) {
    let ManifestEvent {
        action, name, data, ..
    } = ev;
    let Some(status) = data else { return };
    match action {
        EventAction::Remove => cache.clear(&name).await,
        EventAction::Upsert => {
            if !status.online {
                cache.clear(&name).await;
            }
        }
    }
}

/// Run one watch loop until shutdown.
///
/// Every processed event advances the resume revision, so a reconnect
/// replays only what the loop has not seen. A stream that ends is
/// reopened after a backoff delay; the backoff resets on the next
/// processed event.
async fn supervise<T, W, H, Fut>(
    what: &'static str,
    mut shutdown: watch::Receiver<bool>,
    mut resume: Option<u64>,
    watch_fn: W,
    mut handle_event: H,
) where
    T: Send + 'static,
    W: Fn(mpsc::Sender<ManifestEvent<T>>, Option<u64>) -> JoinHandle<()>,
    H: FnMut(ManifestEvent<T>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut backoff = Backoff::new();

    loop {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let watch_handle = watch_fn(tx, resume);
        debug!(what, ?resume, "watch loop connected");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        watch_handle.abort();
                        debug!(what, "watch loop stopped");
                        return;
                    }
                }
                event = rx.recv() => match event {
                    Some(ev) => {
                        resume = Some(ev.revision);
                        backoff.reset();
                        handle_event(ev).await;
                    }
                    None => break,
                },
            }
        }

        watch_handle.abort();
        let delay = backoff.next();
        warn!(what, ?delay, "watch stream ended, reconnecting");
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
