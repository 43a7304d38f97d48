//! # Cascade Cleanup
//!
//! Removes the targets of a deleted Crypt without waiting for owner-reference
//! garbage collection. Only secrets the Secret mirror shows as controlled by
//! that Crypt are deleted.

use super::types::{CleanupReport, Reconciler};
use crate::controller::materializer::is_controlled_by;
use crate::controller::secrets::SecretApiError;
use crate::crd::{Crypt, SecretDefinition};
use crate::observability::metrics;
use tracing::{debug, info, info_span, warn, Instrument};

impl Reconciler {
    /// Delete every target of `crypt` across the namespaces it currently matches
    pub async fn cleanup(&self, crypt: &Crypt) -> CleanupReport {
        let span = info_span!(
            "crypt.cleanup",
            crypt.namespace = ?crypt.metadata.namespace,
            crypt.name = ?crypt.metadata.name
        );
        self.cleanup_inner(crypt).instrument(span).await
    }

    async fn cleanup_inner(&self, crypt: &Crypt) -> CleanupReport {
        let mut report = CleanupReport::default();

        let matched = match self.matched_namespaces(crypt) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(error = %e, "Cannot compute matched namespaces, skipping cleanup");
                return report;
            }
        };

        for definition in &crypt.spec.secrets {
            let Some(name) = self.resolve_target_name(definition).await else {
                report.skipped += matched.len();
                continue;
            };

            for namespace in &matched {
                let owned = match self.secrets.get(Some(namespace), &name) {
                    Ok(Some(secret)) => is_controlled_by(&secret, crypt),
                    Ok(None) => false,
                    Err(e) => {
                        warn!(namespace = %namespace, secret.name = %name, error = %e, "Secret cache unavailable");
                        false
                    }
                };
                if !owned {
                    debug!(namespace = %namespace, secret.name = %name, "Not controlled by this Crypt, leaving in place");
                    report.skipped += 1;
                    continue;
                }

                match self
                    .writer
                    .delete(namespace, &name, self.cleanup_grace_period_secs)
                    .await
                {
                    Ok(()) | Err(SecretApiError::NotFound { .. }) => {
                        metrics::increment_secrets_deleted();
                        report.deleted += 1;
                    }
                    Err(e) => {
                        warn!(namespace = %namespace, secret.name = %name, error = %e, "Failed to delete target secret");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failed,
            "Crypt targets cleaned up"
        );
        report
    }

    /// Target name for cleanup; unnamed definitions are resolved through the store
    async fn resolve_target_name(&self, definition: &SecretDefinition) -> Option<String> {
        if let Some(name) = definition.target_name() {
            return Some(name.to_string());
        }
        match self.store.get(&definition.key).await {
            Ok(payload) if !payload.name.is_empty() => Some(payload.name),
            Ok(_) => None,
            Err(e) => {
                warn!(store.key = %definition.key, error = %e, "Cannot resolve target name for cleanup");
                None
            }
        }
    }
}
