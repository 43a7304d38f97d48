//! # Store Factory
//!
//! Builds the configured [`SecretStore`] from its type name.

use super::{ConsulStore, EmptyStore, FakeStore, MemoryStore, SecretStore, VaultStore};
use crate::config::StoreConfig;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const STORE_TYPE_EMPTY: &str = "empty";
pub const STORE_TYPE_FAKE: &str = "fake";
pub const STORE_TYPE_MEMORY: &str = "memory";
pub const STORE_TYPE_CONSUL: &str = "consul";
pub const STORE_TYPE_VAULT: &str = "vault";

/// Every store type the factory accepts
pub const STORE_TYPES: &[&str] = &[
    STORE_TYPE_EMPTY,
    STORE_TYPE_FAKE,
    STORE_TYPE_MEMORY,
    STORE_TYPE_CONSUL,
    STORE_TYPE_VAULT,
];

#[derive(Debug, Error)]
pub enum StoreFactoryError {
    #[error("invalid store type: {0:?} (expected one of: {list})", list = STORE_TYPES.join(", "))]
    InvalidStoreType(String),
    #[error("failed to build {backend} store client: {source}")]
    Client {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct StoreFactory {
    config: StoreConfig,
}

impl StoreFactory {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Build the store named by `store_type` (case-insensitive)
    pub fn make(&self, store_type: &str) -> Result<Arc<dyn SecretStore>, StoreFactoryError> {
        let normalized = store_type.trim().to_ascii_lowercase();
        let store: Arc<dyn SecretStore> = match normalized.as_str() {
            STORE_TYPE_EMPTY => Arc::new(EmptyStore),
            STORE_TYPE_FAKE => Arc::new(FakeStore),
            STORE_TYPE_MEMORY => Arc::new(MemoryStore::with_entries(
                self.config.memory.clone(),
            )),
            STORE_TYPE_CONSUL => {
                let consul = self.config.consul_or_env();
                Arc::new(ConsulStore::new(&consul).map_err(|source| {
                    StoreFactoryError::Client {
                        backend: STORE_TYPE_CONSUL,
                        source,
                    }
                })?)
            }
            STORE_TYPE_VAULT => {
                let vault = self.config.vault_or_env();
                Arc::new(VaultStore::new(&vault).map_err(|source| {
                    StoreFactoryError::Client {
                        backend: STORE_TYPE_VAULT,
                        source,
                    }
                })?)
            }
            _ => return Err(StoreFactoryError::InvalidStoreType(store_type.to_string())),
        };

        info!(store_type = %store.backend(), "Secret store initialized");
        Ok(store)
    }
}
