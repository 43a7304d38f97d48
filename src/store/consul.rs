//! # Consul Store
//!
//! Reads payloads from the Consul KV HTTP API (`GET /v1/kv/<key>?raw`).
//!
//! A value is either a JSON payload (`{"name", "secretType", "data"}`) or a flat
//! JSON object of field name to base64 value. Flat objects take their name from
//! the last segment of the key.

use super::{name_from_key, Payload, SecretStore, StoreError};
use crate::config::ConsulConfig;
use async_trait::async_trait;
use k8s_openapi::ByteString;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const CONSUL_TOKEN_HEADER: &str = "X-Consul-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ConsulStore {
    client: reqwest::Client,
    address: String,
    token: Option<String>,
    datacenter: Option<String>,
}

impl ConsulStore {
    pub fn new(config: &ConsulConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            address: config.address.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
            datacenter: config.datacenter.clone().filter(|d| !d.is_empty()),
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/v1/kv/{}", self.address, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl SecretStore for ConsulStore {
    async fn get(&self, key: &str) -> Result<Payload, StoreError> {
        let mut request = self.client.get(self.url(key)).query(&[("raw", "true")]);
        if let Some(dc) = &self.datacenter {
            request = request.query(&[("dc", dc.as_str())]);
        }
        if let Some(token) = &self.token {
            request = request.header(CONSUL_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|source| StoreError::Backend {
            key: key.to_string(),
            source,
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(key = %key, "Consul key not found");
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

        decode_value(key, &body)
    }

    fn backend(&self) -> &'static str {
        "consul"
    }
}

/// A structured payload has an object `data` and no keys besides `name` and `secretType`
fn is_structured(object: &serde_json::Map<String, serde_json::Value>) -> bool {
    object.get("data").is_some_and(serde_json::Value::is_object)
        && object
            .keys()
            .all(|k| matches!(k.as_str(), "data" | "name" | "secretType"))
}

/// Decode a raw KV value into a payload
pub(crate) fn decode_value(key: &str, raw: &[u8]) -> Result<Payload, StoreError> {
    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| StoreError::invalid_data(key, e))?;

    let object = value
        .as_object()
        .ok_or_else(|| StoreError::invalid_data(key, "value is not a JSON object"))?;

    let mut payload = if is_structured(object) {
        serde_json::from_value::<Payload>(value).map_err(|e| StoreError::invalid_data(key, e))?
    } else {
        let data = serde_json::from_value::<BTreeMap<String, ByteString>>(value)
            .map_err(|e| StoreError::invalid_data(key, e))?;
        Payload {
            data,
            ..Payload::default()
        }
    };

    if payload.name.is_empty() {
        payload.name = name_from_key(key);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_structured_payload() {
        let raw = br#"{"name":"foo","secretType":"kubernetes.io/tls","data":{"foo":"Zm9vU2VjcmV0"}}"#;
        let payload = decode_value("test/foo", raw).unwrap();
        assert_eq!(payload.name, "foo");
        assert_eq!(payload.declared_type(), Some("kubernetes.io/tls"));
        assert_eq!(payload.data["foo"].0, b"fooSecret".to_vec());
    }

    #[test]
    fn test_decode_flat_map_takes_name_from_key() {
        let raw = br#"{"bar":"YmFyU2VjcmV0"}"#;
        let payload = decode_value("test/bar", raw).unwrap();
        assert_eq!(payload.name, "bar");
        assert_eq!(payload.secret_type, None);
        assert_eq!(payload.data["bar"].0, b"barSecret".to_vec());
    }

    #[test]
    fn test_decode_flat_map_with_data_field() {
        let raw = br#"{"data":"Zm9v","user":"YmFy"}"#;
        let payload = decode_value("app/creds", raw).unwrap();
        assert_eq!(payload.name, "creds");
        assert_eq!(payload.data.len(), 2);
        assert_eq!(payload.data["data"].0, b"foo".to_vec());
        assert_eq!(payload.data["user"].0, b"bar".to_vec());
    }

    #[test]
    fn test_decode_object_data_with_extra_keys_is_flat() {
        // Extra top-level keys mean this is not the structured shape
        let raw = br#"{"data":{"a":"Zm9v"},"user":"YmFy"}"#;
        assert!(matches!(
            decode_value("app/creds", raw),
            Err(StoreError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_non_objects_and_bad_base64() {
        assert!(matches!(
            decode_value("k", b"not json"),
            Err(StoreError::InvalidData { .. })
        ));
        assert!(matches!(
            decode_value("k", b"[1,2]"),
            Err(StoreError::InvalidData { .. })
        ));
        assert!(matches!(
            decode_value("k", br#"{"field":"!!!not-base64!!!"}"#),
            Err(StoreError::InvalidData { .. })
        ));
    }
}
