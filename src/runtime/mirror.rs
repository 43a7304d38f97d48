//! # Resource Mirror
//!
//! A locally cached, eventually consistent copy of one Kubernetes resource kind,
//! kept current by a background watch.
//!
//! [`mirror`] returns two halves:
//! - [`Mirror`] - cheap, cloneable read handle (`get`, `list`, sync state)
//! - [`MirrorFeed`] - owns the reflector writer, applies watch events and
//!   dispatches add/update/delete notifications to registered [`MirrorHandler`]s
//!
//! Reads fail with [`MirrorError::NotSynced`] until the first full list has been
//! installed. During a relist, notifications are held back until the new snapshot
//! is in place; objects that disappeared across the relist are reported as
//! deletions with their last known state.

use crate::runtime::error_policy;
use async_trait::async_trait;
use futures::{pin_mut, StreamExt};
use kube::runtime::reflector::{store::Writer, ObjectRef, Store};
use kube::{Api, Resource};
use kube_runtime::watcher;
use kube_runtime::WatchStreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Bounds shared by every mirrored resource kind
pub trait MirroredResource:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
}

impl<K> MirroredResource for K where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MirrorError {
    #[error("{kind} mirror has not completed its initial sync")]
    NotSynced { kind: &'static str },
    #[error("timed out after {timeout:?} waiting for {kind} mirror to sync")]
    SyncTimeout {
        kind: &'static str,
        timeout: Duration,
    },
}

/// Receives change notifications from a [`MirrorFeed`]
///
/// Every method defaults to a no-op so handlers only implement what they need.
#[async_trait]
pub trait MirrorHandler<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    async fn on_add(&self, _obj: Arc<K>) {}

    async fn on_update(&self, _old: Arc<K>, _new: Arc<K>) {}

    async fn on_delete(&self, _obj: Arc<K>) {}
}

/// Create a mirror for resource kind `K`
pub fn mirror<K: MirroredResource>(kind: &'static str) -> (Mirror<K>, MirrorFeed<K>) {
    let writer = Writer::default();
    let store = writer.as_reader();
    let (synced_tx, synced_rx) = watch::channel(false);

    (
        Mirror {
            kind,
            store,
            synced: synced_rx,
        },
        MirrorFeed {
            kind,
            writer,
            synced: synced_tx,
            handlers: Vec::new(),
            relist: None,
        },
    )
}

/// Read handle over a mirrored resource kind
pub struct Mirror<K: MirroredResource> {
    kind: &'static str,
    store: Store<K>,
    synced: watch::Receiver<bool>,
}

impl<K: MirroredResource> Clone for Mirror<K> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            store: self.store.clone(),
            synced: self.synced.clone(),
        }
    }
}

impl<K: MirroredResource> Debug for Mirror<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("kind", &self.kind)
            .field("synced", &*self.synced.borrow())
            .finish_non_exhaustive()
    }
}

impl<K: MirroredResource> Mirror<K> {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// True once the first full list has been installed
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Wait until the mirror has synced, failing after `timeout`
    #[allow(clippy::let_and_return, reason = "the timeout future borrows `synced`")]
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<(), MirrorError> {
        let mut synced = self.synced.clone();
        let result = match tokio::time::timeout(timeout, synced.wait_for(|s| *s)).await {
            Ok(Ok(_)) => Ok(()),
            // Feed dropped before syncing
            Ok(Err(_)) => Err(MirrorError::NotSynced { kind: self.kind }),
            Err(_) => Err(MirrorError::SyncTimeout {
                kind: self.kind,
                timeout,
            }),
        };
        result
    }

    /// Look up an object by namespace (None for cluster-scoped kinds) and name
    pub fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Arc<K>>, MirrorError> {
        self.ensure_synced()?;
        let mut obj_ref = ObjectRef::<K>::new(name);
        if let Some(ns) = namespace {
            obj_ref = obj_ref.within(ns);
        }
        Ok(self.store.get(&obj_ref))
    }

    /// Every cached object
    pub fn list(&self) -> Result<Vec<Arc<K>>, MirrorError> {
        self.ensure_synced()?;
        Ok(self.store.state())
    }

    /// Every cached object in `namespace`
    pub fn list_namespaced(&self, namespace: &str) -> Result<Vec<Arc<K>>, MirrorError> {
        self.ensure_synced()?;
        Ok(self
            .store
            .state()
            .into_iter()
            .filter(|obj| obj.meta().namespace.as_deref() == Some(namespace))
            .collect())
    }

    fn ensure_synced(&self) -> Result<(), MirrorError> {
        if self.has_synced() {
            Ok(())
        } else {
            Err(MirrorError::NotSynced { kind: self.kind })
        }
    }
}

/// Objects seen during an in-progress relist
struct Relist<K: MirroredResource> {
    previous: HashMap<ObjectRef<K>, Arc<K>>,
    incoming: Vec<Arc<K>>,
}

/// Write half of a mirror: applies watch events and notifies handlers
pub struct MirrorFeed<K: MirroredResource> {
    kind: &'static str,
    writer: Writer<K>,
    synced: watch::Sender<bool>,
    handlers: Vec<Arc<dyn MirrorHandler<K>>>,
    relist: Option<Relist<K>>,
}

impl<K: MirroredResource> Debug for MirrorFeed<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorFeed")
            .field("kind", &self.kind)
            .field("handlers", &self.handlers.len())
            .field("relisting", &self.relist.is_some())
            .finish_non_exhaustive()
    }
}

impl<K: MirroredResource> MirrorFeed<K> {
    /// Register a handler; call before the feed starts running
    pub fn add_handler(&mut self, handler: Arc<dyn MirrorHandler<K>>) {
        self.handlers.push(handler);
    }

    /// Apply one watch event to the cache and dispatch notifications
    pub async fn apply(&mut self, event: watcher::Event<K>) {
        let reader = self.writer.as_reader();
        let old = match &event {
            watcher::Event::Apply(obj) => reader.get(&ObjectRef::from_obj(obj)),
            watcher::Event::Init => {
                debug!(kind = self.kind, "Relist started");
                let previous = reader
                    .state()
                    .into_iter()
                    .map(|obj| (ObjectRef::from_obj(obj.as_ref()), obj))
                    .collect();
                self.relist = Some(Relist {
                    previous,
                    incoming: Vec::new(),
                });
                None
            }
            _ => None,
        };

        self.writer.apply_watcher_event(&event);

        match event {
            watcher::Event::Apply(obj) => {
                let new = Arc::new(obj);
                match old {
                    Some(old) => self.notify_update(old, new).await,
                    None => self.notify_add(new).await,
                }
            }
            watcher::Event::Delete(obj) => self.notify_delete(Arc::new(obj)).await,
            watcher::Event::Init => {}
            watcher::Event::InitApply(obj) => {
                if let Some(relist) = self.relist.as_mut() {
                    relist.incoming.push(Arc::new(obj));
                }
            }
            watcher::Event::InitDone => self.finish_relist().await,
        }
    }

    /// Mark synced and deliver the notifications held back during a relist
    async fn finish_relist(&mut self) {
        let first_sync = !*self.synced.borrow();
        self.synced.send_replace(true);

        let Some(Relist {
            mut previous,
            incoming,
        }) = self.relist.take()
        else {
            return;
        };

        if first_sync {
            info!(kind = self.kind, objects = incoming.len(), "Mirror synced");
        } else {
            debug!(kind = self.kind, objects = incoming.len(), "Relist complete");
        }

        for new in incoming {
            match previous.remove(&ObjectRef::from_obj(new.as_ref())) {
                Some(old) => self.notify_update(old, new).await,
                None => self.notify_add(new).await,
            }
        }
        for (_, gone) in previous {
            self.notify_delete(gone).await;
        }
    }

    /// Consume a watch over `api` forever, re-establishing it when the stream ends
    pub async fn run(mut self, api: Api<K>, config: watcher::Config, restart_delay: Duration) {
        loop {
            let stream = watcher(api.clone(), config.clone()).default_backoff();
            pin_mut!(stream);

            while let Some(event) = stream.next().await {
                match event {
                    Ok(event) => self.apply(event).await,
                    Err(e) => error_policy::log_watch_error(self.kind, &e),
                }
            }

            warn!(
                kind = self.kind,
                "Watch stream ended, restarting in {}s",
                restart_delay.as_secs()
            );
            tokio::time::sleep(restart_delay).await;
        }
    }

    async fn notify_add(&self, obj: Arc<K>) {
        for handler in &self.handlers {
            handler.on_add(Arc::clone(&obj)).await;
        }
    }

    async fn notify_update(&self, old: Arc<K>, new: Arc<K>) {
        for handler in &self.handlers {
            handler.on_update(Arc::clone(&old), Arc::clone(&new)).await;
        }
    }

    async fn notify_delete(&self, obj: Arc<K>) {
        for handler in &self.handlers {
            handler.on_delete(Arc::clone(&obj)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
    use kube::api::ObjectMeta;
    use std::sync::Mutex;

    fn config_map(namespace: &str, name: &str, version: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some(version.to_string()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.seen.lock().unwrap())
        }
    }

    fn describe(cm: &ConfigMap) -> String {
        format!(
            "{}@{}",
            cm.metadata.name.as_deref().unwrap_or_default(),
            cm.metadata.resource_version.as_deref().unwrap_or_default()
        )
    }

    #[async_trait]
    impl MirrorHandler<ConfigMap> for Recorder {
        async fn on_add(&self, obj: Arc<ConfigMap>) {
            self.seen.lock().unwrap().push(format!("add {}", describe(&obj)));
        }

        async fn on_update(&self, old: Arc<ConfigMap>, new: Arc<ConfigMap>) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("update {} -> {}", describe(&old), describe(&new)));
        }

        async fn on_delete(&self, obj: Arc<ConfigMap>) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("delete {}", describe(&obj)));
        }
    }

    async fn synced_with(
        objects: Vec<ConfigMap>,
    ) -> (Mirror<ConfigMap>, MirrorFeed<ConfigMap>, Arc<Recorder>) {
        let (mirror, mut feed) = mirror::<ConfigMap>("ConfigMap");
        let recorder = Arc::new(Recorder::default());
        feed.add_handler(Arc::clone(&recorder) as Arc<dyn MirrorHandler<ConfigMap>>);

        feed.apply(watcher::Event::Init).await;
        for obj in objects {
            feed.apply(watcher::Event::InitApply(obj)).await;
        }
        feed.apply(watcher::Event::InitDone).await;
        (mirror, feed, recorder)
    }

    #[tokio::test]
    async fn test_reads_fail_before_sync() {
        let (mirror, mut feed) = mirror::<ConfigMap>("ConfigMap");
        assert!(!mirror.has_synced());
        assert_eq!(
            mirror.get(Some("test"), "foo"),
            Err(MirrorError::NotSynced { kind: "ConfigMap" })
        );
        assert!(mirror.list().is_err());

        feed.apply(watcher::Event::Init).await;
        feed.apply(watcher::Event::InitApply(config_map("test", "foo", "1")))
            .await;
        assert!(!mirror.has_synced());

        feed.apply(watcher::Event::InitDone).await;
        assert!(mirror.has_synced());
        assert!(mirror.get(Some("test"), "foo").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_initial_sync_notifies_adds() {
        let (mirror, _feed, recorder) = synced_with(vec![
            config_map("test", "foo", "1"),
            config_map("other", "bar", "1"),
        ])
        .await;

        let mut seen = recorder.take();
        seen.sort();
        assert_eq!(seen, vec!["add bar@1", "add foo@1"]);
        assert_eq!(mirror.list().unwrap().len(), 2);
        assert_eq!(mirror.list_namespaced("test").unwrap().len(), 1);
        assert!(mirror.get(Some("test"), "bar").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_and_delete_notifications() {
        let (mirror, mut feed, recorder) = synced_with(vec![config_map("test", "foo", "1")]).await;
        recorder.take();

        feed.apply(watcher::Event::Apply(config_map("test", "foo", "2")))
            .await;
        feed.apply(watcher::Event::Apply(config_map("test", "baz", "3")))
            .await;
        feed.apply(watcher::Event::Delete(config_map("test", "foo", "4")))
            .await;

        assert_eq!(
            recorder.take(),
            vec!["update foo@1 -> foo@2", "add baz@3", "delete foo@4"]
        );
        assert!(mirror.get(Some("test"), "foo").unwrap().is_none());
        assert!(mirror.get(Some("test"), "baz").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_relist_reports_vanished_objects_as_deleted() {
        let (mirror, mut feed, recorder) = synced_with(vec![
            config_map("test", "foo", "1"),
            config_map("test", "bar", "1"),
        ])
        .await;
        recorder.take();

        feed.apply(watcher::Event::Init).await;
        feed.apply(watcher::Event::InitApply(config_map("test", "foo", "5")))
            .await;
        // Old snapshot stays readable until the relist completes
        assert!(mirror.get(Some("test"), "bar").unwrap().is_some());
        assert!(recorder.take().is_empty());

        feed.apply(watcher::Event::InitDone).await;
        assert_eq!(
            recorder.take(),
            vec!["update foo@1 -> foo@5", "delete bar@1"]
        );
        assert!(mirror.get(Some("test"), "bar").unwrap().is_none());
        assert!(mirror.has_synced());
    }

    #[tokio::test]
    async fn test_cluster_scoped_lookup() {
        let (mirror, mut feed) = mirror::<Namespace>("Namespace");
        feed.apply(watcher::Event::Init).await;
        feed.apply(watcher::Event::InitApply(Namespace {
            metadata: ObjectMeta {
                name: Some("test".to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        }))
        .await;
        feed.apply(watcher::Event::InitDone).await;

        assert!(mirror.get(None, "test").unwrap().is_some());
        assert!(mirror.get(None, "missing").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_sync() {
        let (mirror, mut feed) = mirror::<ConfigMap>("ConfigMap");
        assert_eq!(
            mirror.wait_for_sync(Duration::from_secs(1)).await,
            Err(MirrorError::SyncTimeout {
                kind: "ConfigMap",
                timeout: Duration::from_secs(1)
            })
        );

        let waiter = {
            let mirror = mirror.clone();
            tokio::spawn(async move { mirror.wait_for_sync(Duration::from_secs(60)).await })
        };
        feed.apply(watcher::Event::Init).await;
        feed.apply(watcher::Event::InitDone).await;
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }
}
