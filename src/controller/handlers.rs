//! # Notification Handlers
//!
//! Mirror notifications become work-queue keys here.
//!
//! | Source    | Notification | Action                                          |
//! |-----------|--------------|-------------------------------------------------|
//! | Crypt     | add, update  | enqueue the Crypt                               |
//! | Crypt     | delete       | cascade cleanup (cascade mode only)             |
//! | Namespace | add          | enqueue every Crypt whose patterns match it     |
//! | Secret    | delete       | enqueue the live Crypt that controls the secret |

use crate::config::CleanupMode;
use crate::controller::matcher::crypts_matching_namespace;
use crate::controller::object_key;
use crate::controller::ownership::{resolve_owner, Resolution};
use crate::controller::reconciler::{Reconciler, TriggerSource};
use crate::crd::Crypt;
use crate::runtime::mirror::{Mirror, MirrorHandler};
use crate::runtime::queue::WorkQueue;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use std::sync::Arc;
use tracing::{debug, warn};

fn enqueue(queue: &WorkQueue<String>, key: String, trigger: TriggerSource) {
    debug!(crypt.key = %key, trigger = trigger.as_str(), "Enqueueing Crypt");
    queue.add(key);
}

/// Crypt notifications
#[derive(Debug)]
pub struct CryptEventHandler {
    queue: Arc<WorkQueue<String>>,
    reconciler: Arc<Reconciler>,
    cleanup_mode: CleanupMode,
}

impl CryptEventHandler {
    pub fn new(
        queue: Arc<WorkQueue<String>>,
        reconciler: Arc<Reconciler>,
        cleanup_mode: CleanupMode,
    ) -> Self {
        Self {
            queue,
            reconciler,
            cleanup_mode,
        }
    }
}

#[async_trait]
impl MirrorHandler<Crypt> for CryptEventHandler {
    async fn on_add(&self, obj: Arc<Crypt>) {
        if let Some(key) = object_key(obj.as_ref()) {
            enqueue(&self.queue, key, TriggerSource::CryptChanged);
        }
    }

    async fn on_update(&self, _old: Arc<Crypt>, new: Arc<Crypt>) {
        if let Some(key) = object_key(new.as_ref()) {
            enqueue(&self.queue, key, TriggerSource::CryptChanged);
        }
    }

    async fn on_delete(&self, obj: Arc<Crypt>) {
        if let Some(key) = object_key(obj.as_ref()) {
            self.queue.forget(&key);
        }
        match self.cleanup_mode {
            CleanupMode::Cascade => {
                // Off the feed task so later notifications are not held up
                let reconciler = Arc::clone(&self.reconciler);
                tokio::spawn(async move {
                    reconciler.cleanup(&obj).await;
                });
            }
            CleanupMode::Orphan => {
                debug!(crypt.name = ?obj.metadata.name, "Crypt deleted, targets left to garbage collection");
            }
        }
    }
}

/// Namespace notifications: the reverse trigger
#[derive(Debug)]
pub struct NamespaceEventHandler {
    queue: Arc<WorkQueue<String>>,
    crypts: Mirror<Crypt>,
}

impl NamespaceEventHandler {
    pub fn new(queue: Arc<WorkQueue<String>>, crypts: Mirror<Crypt>) -> Self {
        Self { queue, crypts }
    }
}

#[async_trait]
impl MirrorHandler<Namespace> for NamespaceEventHandler {
    async fn on_add(&self, obj: Arc<Namespace>) {
        let Some(namespace) = obj.metadata.name.as_deref() else {
            return;
        };
        let crypts = match self.crypts.list() {
            Ok(crypts) => crypts,
            Err(e) => {
                // Crypts are enqueued on their own initial sync anyway
                debug!(namespace = %namespace, error = %e, "Skipping reverse trigger");
                return;
            }
        };

        for crypt in crypts_matching_namespace(&crypts, namespace) {
            if let Some(key) = object_key(crypt.as_ref()) {
                enqueue(&self.queue, key, TriggerSource::NamespaceAdded);
            }
        }
    }
}

/// Secret notifications: self-healing of deleted targets
#[derive(Debug)]
pub struct SecretEventHandler {
    queue: Arc<WorkQueue<String>>,
    crypts: Mirror<Crypt>,
}

impl SecretEventHandler {
    pub fn new(queue: Arc<WorkQueue<String>>, crypts: Mirror<Crypt>) -> Self {
        Self { queue, crypts }
    }
}

#[async_trait]
impl MirrorHandler<Secret> for SecretEventHandler {
    async fn on_delete(&self, obj: Arc<Secret>) {
        match resolve_owner(&obj, &self.crypts) {
            Ok(Resolution::Owner(key)) => enqueue(&self.queue, key, TriggerSource::SecretDeleted),
            Ok(Resolution::NotOwned) => {}
            Ok(Resolution::Orphan { owner }) => {
                debug!(
                    namespace = ?obj.metadata.namespace,
                    secret.name = ?obj.metadata.name,
                    owner = %owner,
                    "Owner Crypt is gone, ignoring orphaned secret"
                );
            }
            Err(e) => {
                warn!(secret.name = ?obj.metadata.name, error = %e, "Cannot resolve secret owner");
            }
        }
    }
}
