//! # Convergence Pass
//!
//! Brings every (definition, matched namespace) pair of one Crypt up to date.
//! Per-pair failures are logged and skipped; only cache failures fail the pass.

use super::types::{Reconciler, ReconcilerError, SyncReport, UpsertOutcome};
use crate::constants::{ACTION_RECONCILE, MESSAGE_RESOURCE_SYNCED, REASON_SYNCED};
use crate::controller::matcher::NamespacePatterns;
use crate::controller::materializer::materialize;
use crate::controller::secrets::SecretApiError;
use crate::controller::split_key;
use crate::crd::Crypt;
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::events::EventType;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

impl Reconciler {
    /// Run one convergence pass for the Crypt named by `key`
    pub async fn sync(&self, key: &str) -> Result<SyncReport, ReconcilerError> {
        let span = info_span!("crypt.sync", crypt.key = %key);
        let start = Instant::now();
        metrics::increment_reconciliations();

        let result = self.sync_inner(key).instrument(span).await;

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        if result.is_err() {
            metrics::increment_reconciliation_errors();
        }
        result
    }

    async fn sync_inner(&self, key: &str) -> Result<SyncReport, ReconcilerError> {
        let (namespace, name) = split_key(key)?;

        let crypt = self
            .crypts
            .get(Some(namespace), name)
            .map_err(|source| ReconcilerError::CryptLookup {
                key: key.to_string(),
                source,
            })?;
        let Some(crypt) = crypt else {
            info!("Crypt no longer exists, nothing to do");
            return Ok(SyncReport::default());
        };

        let matched = self.matched_namespaces(&crypt)?;
        let mut report = SyncReport {
            crypt_found: true,
            matched_namespaces: matched.len(),
            ..SyncReport::default()
        };

        if matched.is_empty() {
            debug!("No namespaces match, nothing to materialize");
        } else {
            for definition in &crypt.spec.secrets {
                let payload = match self.store.get(&definition.key).await {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(
                            store.key = %definition.key,
                            store.backend = self.store.backend(),
                            error = %e,
                            "Failed to fetch secret from store, skipping {} namespace(s)",
                            matched.len()
                        );
                        metrics::increment_store_fetch_errors(self.store.backend(), e.kind());
                        report.skipped += matched.len();
                        continue;
                    }
                };

                for target_namespace in &matched {
                    let Some(secret) = materialize(&crypt, definition, target_namespace, &payload)
                    else {
                        warn!(
                            namespace = %target_namespace,
                            store.key = %definition.key,
                            "Definition has no name and the store payload declares none, skipping"
                        );
                        report.skipped += 1;
                        continue;
                    };

                    match self.upsert(&secret).await {
                        Ok(UpsertOutcome::Created) => report.created += 1,
                        Ok(UpsertOutcome::Updated) => report.updated += 1,
                        Err(e) => {
                            warn!(
                                namespace = %target_namespace,
                                secret.name = ?secret.metadata.name,
                                error = %e,
                                "Failed to write target secret"
                            );
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        self.events
            .publish(
                &crypt,
                EventType::Normal,
                REASON_SYNCED,
                ACTION_RECONCILE,
                Some(MESSAGE_RESOURCE_SYNCED.to_string()),
            )
            .await;

        info!(
            namespaces = report.matched_namespaces,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "Crypt synced"
        );
        Ok(report)
    }

    /// Namespaces currently matched by the Crypt's patterns
    pub(super) fn matched_namespaces(
        &self,
        crypt: &Crypt,
    ) -> Result<BTreeSet<String>, ReconcilerError> {
        let names = self
            .namespace_names()
            .map_err(ReconcilerError::NamespaceList)?;
        Ok(NamespacePatterns::for_crypt(crypt).select(names.iter().map(String::as_str)))
    }

    /// Create the secret, replacing it in full if it already exists
    async fn upsert(&self, secret: &Secret) -> Result<UpsertOutcome, SecretApiError> {
        match self.writer.create(secret).await {
            Ok(_) => {
                metrics::increment_secrets_created();
                debug!(secret.name = ?secret.metadata.name, namespace = ?secret.metadata.namespace, "Created target secret");
                Ok(UpsertOutcome::Created)
            }
            Err(SecretApiError::AlreadyExists { .. }) => {
                self.writer.replace(secret).await?;
                metrics::increment_secrets_updated();
                debug!(secret.name = ?secret.metadata.name, namespace = ?secret.metadata.namespace, "Replaced target secret");
                Ok(UpsertOutcome::Updated)
            }
            Err(e) => Err(e),
        }
    }
}
