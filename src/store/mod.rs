//! # Secret Stores
//!
//! Keyed lookup of secret payloads. Each backend implements [`SecretStore`]; the
//! [`StoreFactory`] selects one by name at startup.
//!
//! - `empty` - every key is missing
//! - `fake` - every key resolves to an empty payload named "fake"
//! - `memory` - thread-safe in-process map, seeded from the store config file
//! - `consul` - Consul KV over HTTP
//! - `vault` - Vault KV v2 over HTTP

use async_trait::async_trait;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod consul;
pub mod empty;
pub mod factory;
pub mod fake;
pub mod memory;
pub mod vault;

pub use consul::ConsulStore;
pub use empty::EmptyStore;
pub use factory::{StoreFactory, StoreFactoryError};
pub use fake::FakeStore;
pub use memory::MemoryStore;
pub use vault::VaultStore;

/// A secret payload as held by a store
///
/// Serialized as `{"name": ..., "secretType": ..., "data": {field: base64}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Name the payload declares for itself
    #[serde(default)]
    pub name: String,
    /// Secret type declared by the payload, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<String>,
    /// Field name to raw bytes
    #[serde(default)]
    pub data: BTreeMap<String, ByteString>,
}

impl Payload {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a field, returning the payload for chaining
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(field.into(), ByteString(value.into()));
        self
    }

    /// Declared secret type, ignoring blank values
    pub fn declared_type(&self) -> Option<&str> {
        self.secret_type.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Errors returned by [`SecretStore::get`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {key}")]
    NotFound { key: String },
    #[error("value for key {key} could not be decoded into a store object: {reason}")]
    InvalidData { key: String, reason: String },
    #[error("store request for key {key} failed: {source}")]
    Backend {
        key: String,
        #[source]
        source: reqwest::Error,
    },
}

impl StoreError {
    pub fn not_found(key: &str) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    pub fn invalid_data(key: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidData {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short label used for metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::InvalidData { .. } => "invalid_data",
            StoreError::Backend { .. } => "backend",
        }
    }
}

/// Keyed lookup returning an opaque payload
///
/// Implementations must tolerate concurrent calls from every reconcile worker.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Fetch the payload stored under `key`
    async fn get(&self, key: &str) -> Result<Payload, StoreError>;

    /// Backend name, used in logs and metrics
    fn backend(&self) -> &'static str;
}

/// Name derived from a store key: its last non-empty path segment
pub(crate) fn name_from_key(key: &str) -> String {
    key.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(key)
        .to_string()
}
