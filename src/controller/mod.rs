//! # Controller
//!
//! The reconciliation core: turns Crypt resources into target secrets.
//!
//! ## Module Structure
//!
//! - [`backoff`] - per-key exponential backoff used by the work queue
//! - [`matcher`] - namespace pattern matching and the reverse trigger
//! - [`materializer`] - builds the desired target secret
//! - [`ownership`] - maps deleted target secrets back to their Crypt
//! - [`reconciler`] - convergence pass and cascade cleanup
//! - [`handlers`] - mirror notification handlers feeding the work queue
//! - [`secrets`] / [`events`] - target-object API and event publishing seams
//! - [`server`] - metrics and probe endpoints

use thiserror::Error;

pub mod backoff;
pub mod events;
pub mod handlers;
pub mod matcher;
pub mod materializer;
pub mod ownership;
pub mod reconciler;
pub mod secrets;
pub mod server;

pub use reconciler::{Reconciler, ReconcilerError, SyncReport};

/// A work-queue key that does not name a namespaced object
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unexpected key format: {0:?}")]
pub struct KeyError(pub String);

/// Work-queue key for a Crypt: `namespace/name`
pub fn crypt_key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}/{name}")
    }
}

/// Split a `namespace/name` key; a key without a slash has an empty namespace
pub fn split_key(key: &str) -> Result<(&str, &str), KeyError> {
    let mut parts = key.split('/');
    let (namespace, name) = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) => ("", name),
        (Some(namespace), Some(name), None) => (namespace, name),
        _ => return Err(KeyError(key.to_string())),
    };
    if name.is_empty() {
        return Err(KeyError(key.to_string()));
    }
    Ok((namespace, name))
}

/// Work-queue key for any object, from its metadata
pub fn object_key<K: kube::Resource>(obj: &K) -> Option<String> {
    let meta = obj.meta();
    let name = meta.name.as_deref()?;
    Some(crypt_key(meta.namespace.as_deref().unwrap_or_default(), name))
}
