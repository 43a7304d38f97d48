//! # Crypt Spec
//!
//! Main CRD specification types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Crypt Custom Resource Definition
///
/// Declares which store payloads are materialized as Secrets and which namespaces
/// receive them. Namespace entries are regular expressions searched (unanchored)
/// against every namespace name.
///
/// # Example
///
/// ```yaml
/// apiVersion: crypt.io/v1alpha1
/// kind: Crypt
/// metadata:
///   name: test-crypt
///   namespace: default
/// spec:
///   secrets:
///     - name: test-foo-secret
///       key: test/foo
///     - name: test-bar-secret
///       type: kubernetes.io/dockerconfigjson
///       key: test/bar
///   namespaces:
///     - "^team-a-"
///     - "^shared$"
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Crypt",
    group = "crypt.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::CryptStatus",
    shortname = "crypt"
)]
#[serde(rename_all = "camelCase")]
pub struct CryptSpec {
    /// Secrets to materialize in every matched namespace
    #[serde(default)]
    pub secrets: Vec<SecretDefinition>,
    /// Namespace selection patterns (regular expressions, unanchored)
    #[serde(default)]
    pub namespaces: Vec<String>,
}

/// One secret to materialize
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretDefinition {
    /// Target Secret name
    /// Falls back to the name declared by the store payload when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Secret type (e.g. "Opaque", "kubernetes.io/tls")
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Lookup key in the secret store
    pub key: String,
    /// Labels copied onto the target Secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// Annotations copied onto the target Secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl SecretDefinition {
    /// Definition with an explicit target name and no type override
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            key: key.into(),
            ..Self::default()
        }
    }

    /// Explicit type override, ignoring blank values
    pub fn type_override(&self) -> Option<&str> {
        self.type_.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Explicit target name, ignoring blank values
    pub fn target_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}
