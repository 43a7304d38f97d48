//! # Target Secret API
//!
//! Create, replace and delete target secrets. [`SecretWriter`] is the seam the
//! reconciler writes through; [`KubeSecretWriter`] talks to the API server.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretApiError {
    #[error("secret {namespace}/{name} already exists")]
    AlreadyExists { namespace: String, name: String },
    #[error("secret {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },
    #[error("secret API request failed: {0}")]
    Api(#[source] kube::Error),
}

impl SecretApiError {
    /// Classify a kube error for the secret `namespace/name`
    pub fn from_kube(error: kube::Error, namespace: &str, name: &str) -> Self {
        match error {
            kube::Error::Api(api_err) if api_err.code == 409 => SecretApiError::AlreadyExists {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(api_err) if api_err.code == 404 => SecretApiError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            other => SecretApiError::Api(other),
        }
    }
}

#[async_trait]
pub trait SecretWriter: Send + Sync {
    async fn create(&self, secret: &Secret) -> Result<Secret, SecretApiError>;

    /// Full replacement of an existing secret
    async fn replace(&self, secret: &Secret) -> Result<Secret, SecretApiError>;

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: u32,
    ) -> Result<(), SecretApiError>;
}

#[derive(Clone)]
pub struct KubeSecretWriter {
    client: Client,
}

impl KubeSecretWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl std::fmt::Debug for KubeSecretWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretWriter").finish_non_exhaustive()
    }
}

fn identity(secret: &Secret) -> (&str, &str) {
    (
        secret.metadata.namespace.as_deref().unwrap_or_default(),
        secret.metadata.name.as_deref().unwrap_or_default(),
    )
}

#[async_trait]
impl SecretWriter for KubeSecretWriter {
    async fn create(&self, secret: &Secret) -> Result<Secret, SecretApiError> {
        let (namespace, name) = identity(secret);
        self.api(namespace)
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| SecretApiError::from_kube(e, namespace, name))
    }

    async fn replace(&self, secret: &Secret) -> Result<Secret, SecretApiError> {
        let (namespace, name) = identity(secret);
        self.api(namespace)
            .replace(name, &PostParams::default(), secret)
            .await
            .map_err(|e| SecretApiError::from_kube(e, namespace, name))
    }

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: u32,
    ) -> Result<(), SecretApiError> {
        let params = DeleteParams {
            grace_period_seconds: Some(grace_period_secs),
            ..DeleteParams::default()
        };
        self.api(namespace)
            .delete(name, &params)
            .await
            .map(|_| ())
            .map_err(|e| SecretApiError::from_kube(e, namespace, name))
    }
}
