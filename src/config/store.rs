//! # Store Configuration
//!
//! Backend settings read from the file named by `--store-config` / `STORE_CONFIG`.
//! The file is YAML (JSON is accepted as a subset):
//!
//! ```yaml
//! memory:
//!   test/foo:
//!     name: foo
//!     data:
//!       foo: Zm9vU2VjcmV0
//! consul:
//!   address: http://consul.consul:8500
//!   token: s3cr3t
//! vault:
//!   address: https://vault.vault:8200
//!   mount: secret
//! ```
//!
//! When a backend section is absent its settings come from the standard client
//! environment variables (`CONSUL_HTTP_ADDR`, `CONSUL_HTTP_TOKEN`, `VAULT_ADDR`,
//! `VAULT_TOKEN`).

use crate::constants::{DEFAULT_CONSUL_ADDRESS, DEFAULT_VAULT_ADDRESS, DEFAULT_VAULT_MOUNT};
use crate::store::Payload;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Seed entries for the memory backend, keyed by store key
    #[serde(default)]
    pub memory: BTreeMap<String, Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consul: Option<ConsulConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<VaultConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsulConfig {
    #[serde(default = "default_consul_address")]
    pub address: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub datacenter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    #[serde(default = "default_vault_address")]
    pub address: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_vault_mount")]
    pub mount: String,
}

fn default_consul_address() -> String {
    DEFAULT_CONSUL_ADDRESS.to_string()
}

fn default_vault_address() -> String {
    DEFAULT_VAULT_ADDRESS.to_string()
}

fn default_vault_mount() -> String {
    DEFAULT_VAULT_MOUNT.to_string()
}

impl ConsulConfig {
    pub fn from_env() -> Self {
        Self {
            address: std::env::var("CONSUL_HTTP_ADDR")
                .map(|addr| with_scheme(&addr))
                .unwrap_or_else(|_| default_consul_address()),
            token: std::env::var("CONSUL_HTTP_TOKEN").ok(),
            datacenter: None,
        }
    }
}

impl VaultConfig {
    pub fn from_env() -> Self {
        Self {
            address: std::env::var("VAULT_ADDR").unwrap_or_else(|_| default_vault_address()),
            token: std::env::var("VAULT_TOKEN").ok(),
            mount: default_vault_mount(),
        }
    }
}

/// Consul accepts bare `host:port` addresses
fn with_scheme(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

impl StoreConfig {
    /// Parse store configuration from YAML or JSON text
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).context("Failed to parse store configuration")
    }

    /// Read and parse the store configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read store config file {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Invalid store config file {}", path.display()))
    }

    /// Load from `path` when given, otherwise an empty configuration
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn consul_or_env(&self) -> ConsulConfig {
        self.consul.clone().unwrap_or_else(ConsulConfig::from_env)
    }

    pub fn vault_or_env(&self) -> VaultConfig {
        self.vault.clone().unwrap_or_else(VaultConfig::from_env)
    }
}
