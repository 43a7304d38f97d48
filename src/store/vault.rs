//! # Vault Store
//!
//! Reads payloads from a Vault KV v2 mount (`GET /v1/<mount>/data/<key>`).
//! Every value under `data.data` must be a string; the payload is named after
//! the last segment of the key.

use super::{name_from_key, Payload, SecretStore, StoreError};
use crate::config::VaultConfig;
use async_trait::async_trait;
use k8s_openapi::ByteString;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct VaultStore {
    client: reqwest::Client,
    address: String,
    mount: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KvV2Response {
    data: Option<KvV2Data>,
}

#[derive(Debug, Deserialize)]
struct KvV2Data {
    data: Option<serde_json::Map<String, serde_json::Value>>,
}

impl VaultStore {
    pub fn new(config: &VaultConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            address: config.address.trim_end_matches('/').to_string(),
            mount: config.mount.trim_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, key: &str) -> String {
        format!(
            "{}/v1/{}/data/{}",
            self.address,
            self.mount,
            key.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    async fn get(&self, key: &str) -> Result<Payload, StoreError> {
        let mut request = self.client.get(self.url(key));
        if let Some(token) = &self.token {
            request = request.header(VAULT_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|source| StoreError::Backend {
            key: key.to_string(),
            source,
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(key = %key, mount = %self.mount, "Vault secret not found");
            return Err(StoreError::not_found(key));
        }

        let body = response
            .error_for_status()
            .map_err(|source| StoreError::Backend {
                key: key.to_string(),
                source,
            })?
            .bytes()
            .await
            .map_err(|source| StoreError::Backend {
                key: key.to_string(),
                source,
            })?;

        decode_response(key, &body)
    }

    fn backend(&self) -> &'static str {
        "vault"
    }
}

pub(crate) fn decode_response(key: &str, raw: &[u8]) -> Result<Payload, StoreError> {
    let response: KvV2Response =
        serde_json::from_slice(raw).map_err(|e| StoreError::invalid_data(key, e))?;

    // A soft-deleted version comes back with `data.data: null`
    let fields = response
        .data
        .and_then(|d| d.data)
        .ok_or_else(|| StoreError::not_found(key))?;

    let mut data = BTreeMap::new();
    for (field, value) in fields {
        match value {
            serde_json::Value::String(s) => {
                data.insert(field, ByteString(s.into_bytes()));
            }
            other => {
                return Err(StoreError::invalid_data(
                    key,
                    format!("field {field} is not a string (got {other})"),
                ));
            }
        }
    }

    Ok(Payload {
        name: name_from_key(key),
        secret_type: None,
        data,
    })
}
