//! # Types
//!
//! Core types for the reconciler.

use crate::constants::DEFAULT_CLEANUP_GRACE_PERIOD_SECS;
use crate::controller::events::EventPublisher;
use crate::controller::secrets::SecretWriter;
use crate::controller::KeyError;
use crate::crd::Crypt;
use crate::runtime::mirror::{Mirror, MirrorError};
use crate::store::SecretStore;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("failed to read Crypt {key} from cache: {source}")]
    CryptLookup {
        key: String,
        #[source]
        source: MirrorError,
    },
    #[error("failed to list namespaces: {0}")]
    NamespaceList(#[source] MirrorError),
}

impl ReconcilerError {
    /// Structural failures are retried with backoff; a malformed key never is
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcilerError::InvalidKey(_))
    }
}

/// Why a key was put on the work queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Crypt created or changed
    CryptChanged,
    /// A namespace appeared that the Crypt's patterns match
    NamespaceAdded,
    /// A target secret the Crypt controls was deleted
    SecretDeleted,
    /// Retry after a structural failure
    ErrorBackoff,
    /// Periodic re-run of every Crypt
    Resync,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::CryptChanged => "crypt-changed",
            TriggerSource::NamespaceAdded => "namespace-added",
            TriggerSource::SecretDeleted => "secret-deleted",
            TriggerSource::ErrorBackoff => "error-backoff",
            TriggerSource::Resync => "resync",
        }
    }
}

/// How a target secret was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Summary of one convergence pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// False when the Crypt was already gone; nothing else was done
    pub crypt_found: bool,
    pub matched_namespaces: usize,
    pub created: usize,
    pub updated: usize,
    /// Pairs skipped because the payload could not be fetched or named
    pub skipped: usize,
    /// Pairs whose write was rejected by the API
    pub failed: usize,
}

impl SyncReport {
    /// Pairs that now hold an up-to-date target
    pub fn converged(&self) -> usize {
        self.created + self.updated
    }
}

/// Summary of a cascade cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    /// Targets that were missing or not controlled by the Crypt
    pub skipped: usize,
    pub failed: usize,
}

pub struct Reconciler {
    pub(super) crypts: Mirror<Crypt>,
    pub(super) namespaces: Mirror<Namespace>,
    pub(super) secrets: Mirror<Secret>,
    pub(super) store: Arc<dyn SecretStore>,
    pub(super) writer: Arc<dyn SecretWriter>,
    pub(super) events: Arc<dyn EventPublisher>,
    pub(super) cleanup_grace_period_secs: u32,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store.backend())
            .field("crypts_synced", &self.crypts.has_synced())
            .field("namespaces_synced", &self.namespaces.has_synced())
            .field("secrets_synced", &self.secrets.has_synced())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        crypts: Mirror<Crypt>,
        namespaces: Mirror<Namespace>,
        secrets: Mirror<Secret>,
        store: Arc<dyn SecretStore>,
        writer: Arc<dyn SecretWriter>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            crypts,
            namespaces,
            secrets,
            store,
            writer,
            events,
            cleanup_grace_period_secs: DEFAULT_CLEANUP_GRACE_PERIOD_SECS,
        }
    }

    /// Grace period passed to cascade deletes
    #[must_use]
    pub fn with_cleanup_grace_period(mut self, secs: u32) -> Self {
        self.cleanup_grace_period_secs = secs;
        self
    }

    pub fn crypts(&self) -> &Mirror<Crypt> {
        &self.crypts
    }

    /// Wait for the Crypt, Namespace and Secret mirrors to finish their initial sync
    pub async fn wait_for_caches(&self, timeout: Duration) -> Result<(), MirrorError> {
        futures::try_join!(
            self.crypts.wait_for_sync(timeout),
            self.namespaces.wait_for_sync(timeout),
            self.secrets.wait_for_sync(timeout),
        )?;
        Ok(())
    }

    /// Names of every namespace currently known
    pub(super) fn namespace_names(&self) -> Result<Vec<String>, MirrorError> {
        Ok(self
            .namespaces
            .list()?
            .iter()
            .filter_map(|ns| ns.metadata.name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(!ReconcilerError::InvalidKey(KeyError("a/b/c".to_string())).is_retryable());
        assert!(ReconcilerError::NamespaceList(MirrorError::NotSynced { kind: "Namespace" })
            .is_retryable());
        assert!(ReconcilerError::CryptLookup {
            key: "default/x".to_string(),
            source: MirrorError::NotSynced { kind: "Crypt" },
        }
        .is_retryable());
    }

    #[test]
    fn test_trigger_source_labels() {
        assert_eq!(TriggerSource::CryptChanged.as_str(), "crypt-changed");
        assert_eq!(TriggerSource::ErrorBackoff.as_str(), "error-backoff");
    }

    #[test]
    fn test_report_converged() {
        let report = SyncReport {
            crypt_found: true,
            created: 3,
            updated: 1,
            ..SyncReport::default()
        };
        assert_eq!(report.converged(), 4);
    }
}
