use crate::readiness::CacheStatus;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use kube::runtime::watcher;
use kube::Resource;
use std::collections::BTreeMap;
use tenant_rbac_core::{ObjectKey, ResourceEvent};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Local cache over a watch stream.
///
/// Turns raw watcher events into typed add/update/delete notifications. An
/// update carries the previously cached object so consumers can filter resync
/// replays. A re-list (`Init` .. `InitDone`) is buffered and diffed against
/// the cache, so objects that vanished while the watch was down are reported
/// as deleted.
pub struct Informer<K> {
    name: String,
    cache: BTreeMap<ObjectKey, K>,
    relist: Option<BTreeMap<ObjectKey, K>>,
    synced: watch::Sender<bool>,
}

impl<K: Resource + Clone> Informer<K> {
    pub fn new(name: impl Into<String>) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            name: name.into(),
            cache: BTreeMap::new(),
            relist: None,
            synced,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for the readiness gate; turns true after the first full listing
    pub fn sync_flag(&self) -> SyncFlag {
        SyncFlag {
            name: self.name.clone(),
            rx: self.synced.subscribe(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&K> {
        self.cache.get(key)
    }

    /// Apply one watcher event and return the notifications it produces
    pub fn apply(&mut self, event: watcher::Event<K>) -> Vec<ResourceEvent<K>> {
        match event {
            watcher::Event::Apply(obj) => {
                let key = ObjectKey::of(&obj);
                match self.cache.insert(key, obj.clone()) {
                    Some(old) => vec![ResourceEvent::Updated { old, new: obj }],
                    None => vec![ResourceEvent::Added(obj)],
                }
            }
            watcher::Event::Delete(obj) => {
                self.cache.remove(&ObjectKey::of(&obj));
                vec![ResourceEvent::Deleted(obj)]
            }
            watcher::Event::Init => {
                debug!("{} cache: re-list started", self.name);
                self.relist = Some(BTreeMap::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                self.relist
                    .get_or_insert_with(BTreeMap::new)
                    .insert(ObjectKey::of(&obj), obj);
                Vec::new()
            }
            watcher::Event::InitDone => {
                let listed = self.relist.take().unwrap_or_default();
                let mut previous = std::mem::take(&mut self.cache);
                let mut events = Vec::with_capacity(listed.len());

                for (key, obj) in &listed {
                    match previous.remove(key) {
                        Some(old) => events.push(ResourceEvent::Updated {
                            old,
                            new: obj.clone(),
                        }),
                        None => events.push(ResourceEvent::Added(obj.clone())),
                    }
                }
                events.extend(previous.into_values().map(ResourceEvent::Deleted));

                self.cache = listed;
                if !*self.synced.borrow() {
                    info!("{} cache synced with {} object(s)", self.name, self.cache.len());
                }
                self.synced.send_replace(true);
                events
            }
        }
    }
}

/// Readiness of one informer cache
#[derive(Clone)]
pub struct SyncFlag {
    name: String,
    rx: watch::Receiver<bool>,
}

impl SyncFlag {
    pub fn is_synced(&self) -> bool {
        *self.rx.borrow()
    }
}

#[async_trait]
impl CacheStatus for SyncFlag {
    fn name(&self) -> &str {
        &self.name
    }

    async fn wait_synced(&self) {
        let mut rx = self.rx.clone();
        let synced = rx.wait_for(|synced| *synced).await.is_ok();
        if !synced {
            // Informer dropped before syncing; it never will
            std::future::pending::<()>().await;
        }
    }
}

/// Drive a watcher stream through an informer into `tx` until cancelled.
///
/// Watcher errors are logged; the stream's own backoff handles the retry.
pub async fn pump<K, S>(
    stream: S,
    mut informer: Informer<K>,
    tx: mpsc::Sender<ResourceEvent<K>>,
    token: CancellationToken,
) where
    K: Resource + Clone,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
{
    let mut stream = std::pin::pin!(stream);
    info!("Starting {} watcher", informer.name());

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("{} watcher shutting down", informer.name());
                return;
            }
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    for notification in informer.apply(event) {
                        if tx.send(notification).await.is_err() {
                            debug!("{} event queue closed, stopping watcher", informer.name());
                            return;
                        }
                    }
                }
                Some(Err(e)) => warn!("{} watch error: {}", informer.name(), e),
                None => {
                    warn!("{} watch stream ended", informer.name());
                    return;
                }
            }
        }
    }
}
