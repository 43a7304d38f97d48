//! Common test utilities
//!
//! In-memory stand-ins for the Kubernetes API (secret writes, events) and
//! helpers to build synced mirrors without a cluster.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use async_trait::async_trait;
use crypt_controller::controller::events::EventPublisher;
use crypt_controller::controller::secrets::{SecretApiError, SecretWriter};
use crypt_controller::crd::{Crypt, CryptSpec, SecretDefinition};
use crypt_controller::runtime::mirror::{mirror, Mirror, MirrorFeed, MirroredResource};
use crypt_controller::store::{MemoryStore, Payload};
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::ObjectMeta;
use kube::runtime::events::EventType;
use kube_runtime::watcher;
use std::collections::BTreeMap;
use std::sync::{Mutex, Once};

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests that open HTTP clients
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// One call made against the target-object API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    Create { namespace: String, name: String },
    Replace { namespace: String, name: String },
    Delete {
        namespace: String,
        name: String,
        grace_period_secs: u32,
    },
}

/// In-memory target-object API that records every call
#[derive(Debug, Default)]
pub struct RecordingSecretWriter {
    objects: Mutex<BTreeMap<(String, String), Secret>>,
    calls: Mutex<Vec<WriteCall>>,
}

fn identity(secret: &Secret) -> (String, String) {
    (
        secret.metadata.namespace.clone().unwrap_or_default(),
        secret.metadata.name.clone().unwrap_or_default(),
    )
}

impl RecordingSecretWriter {
    pub fn calls(&self) -> Vec<WriteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn creates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, WriteCall::Create { .. }))
            .count()
    }

    pub fn replaces(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, WriteCall::Replace { .. }))
            .count()
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn objects(&self) -> Vec<Secret> {
        self.objects.lock().unwrap().values().cloned().collect()
    }

    /// Remove a secret out of band, as `kubectl delete` would
    pub fn remove(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
    }

    /// Seed a pre-existing secret without recording a call
    pub fn seed(&self, secret: Secret) {
        self.objects
            .lock()
            .unwrap()
            .insert(identity(&secret), secret);
    }
}

#[async_trait]
impl SecretWriter for RecordingSecretWriter {
    async fn create(&self, secret: &Secret) -> Result<Secret, SecretApiError> {
        let (namespace, name) = identity(secret);
        self.calls.lock().unwrap().push(WriteCall::Create {
            namespace: namespace.clone(),
            name: name.clone(),
        });
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&(namespace.clone(), name.clone())) {
            return Err(SecretApiError::AlreadyExists { namespace, name });
        }
        objects.insert((namespace, name), secret.clone());
        Ok(secret.clone())
    }

    async fn replace(&self, secret: &Secret) -> Result<Secret, SecretApiError> {
        let (namespace, name) = identity(secret);
        self.calls.lock().unwrap().push(WriteCall::Replace {
            namespace: namespace.clone(),
            name: name.clone(),
        });
        let mut objects = self.objects.lock().unwrap();
        match objects.get_mut(&(namespace.clone(), name.clone())) {
            Some(existing) => {
                *existing = secret.clone();
                Ok(secret.clone())
            }
            None => Err(SecretApiError::NotFound { namespace, name }),
        }
    }

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: u32,
    ) -> Result<(), SecretApiError> {
        self.calls.lock().unwrap().push(WriteCall::Delete {
            namespace: namespace.to_string(),
            name: name.to_string(),
            grace_period_secs,
        });
        self.objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| SecretApiError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

/// A published event: (crypt name, type, reason)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub crypt: String,
    pub normal: bool,
    pub reason: String,
    pub action: String,
}

#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<PublishedEvent>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        crypt: &Crypt,
        type_: EventType,
        reason: &str,
        action: &str,
        _note: Option<String>,
    ) {
        self.events.lock().unwrap().push(PublishedEvent {
            crypt: crypt.metadata.name.clone().unwrap_or_default(),
            normal: matches!(type_, EventType::Normal),
            reason: reason.to_string(),
            action: action.to_string(),
        });
    }
}

pub fn crypt(
    namespace: &str,
    name: &str,
    definitions: Vec<SecretDefinition>,
    patterns: &[&str],
) -> Crypt {
    let mut crypt = Crypt::new(
        name,
        CryptSpec {
            secrets: definitions,
            namespaces: patterns.iter().map(|p| p.to_string()).collect(),
        },
    );
    crypt.metadata.namespace = Some(namespace.to_string());
    crypt.metadata.uid = Some(format!("uid-{namespace}-{name}"));
    crypt
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}

/// `test-crypt` in `default`: foo and bar secrets into test-ns1 and test-ns2
pub fn scenario_crypt() -> Crypt {
    crypt(
        "default",
        "test-crypt",
        vec![
            SecretDefinition::new("test-foo-secret", "test/foo"),
            SecretDefinition::new("test-bar-secret", "test/bar"),
        ],
        &["test-ns1", "test-ns2"],
    )
}

pub fn scenario_store() -> MemoryStore {
    MemoryStore::with_entries([
        ("test/foo", Payload::new("foo").with_field("foo", "fooSecret")),
        ("test/bar", Payload::new("bar").with_field("bar", "barSecret")),
    ])
}

/// Build a mirror and feed it one complete initial list
pub async fn synced_mirror<K: MirroredResource>(
    kind: &'static str,
    objects: Vec<K>,
) -> (Mirror<K>, MirrorFeed<K>) {
    let (mirror, mut feed) = mirror::<K>(kind);
    feed.apply(watcher::Event::Init).await;
    for obj in objects {
        feed.apply(watcher::Event::InitApply(obj)).await;
    }
    feed.apply(watcher::Event::InitDone).await;
    (mirror, feed)
}

/// Synced mirrors for the three watched kinds
pub struct TestCluster {
    pub crypts: Mirror<Crypt>,
    pub crypt_feed: MirrorFeed<Crypt>,
    pub namespaces: Mirror<Namespace>,
    pub namespace_feed: MirrorFeed<Namespace>,
    pub secrets: Mirror<Secret>,
    pub secret_feed: MirrorFeed<Secret>,
}

impl TestCluster {
    pub async fn new(crypts: Vec<Crypt>, namespaces: &[&str]) -> Self {
        let (crypts, crypt_feed) = synced_mirror("Crypt", crypts).await;
        let (namespaces, namespace_feed) =
            synced_mirror("Namespace", namespaces.iter().map(|n| namespace(n)).collect()).await;
        let (secrets, secret_feed) = synced_mirror::<Secret>("Secret", Vec::new()).await;
        Self {
            crypts,
            crypt_feed,
            namespaces,
            namespace_feed,
            secrets,
            secret_feed,
        }
    }

    /// Push every secret the writer holds into the Secret mirror
    pub async fn observe_secrets(&mut self, writer: &RecordingSecretWriter) {
        for secret in writer.objects() {
            self.secret_feed.apply(watcher::Event::Apply(secret)).await;
        }
    }
}
