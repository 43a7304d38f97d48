//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `crypt_controller_reconciliations_total` - Total number of convergence passes
//! - `crypt_controller_reconciliation_errors_total` - Passes that ended in a structural error
//! - `crypt_controller_reconciliation_duration_seconds` - Duration of convergence passes
//! - `crypt_controller_secrets_created_total` - Target secrets created
//! - `crypt_controller_secrets_updated_total` - Target secrets replaced
//! - `crypt_controller_secrets_deleted_total` - Target secrets removed by cascade cleanup
//! - `crypt_controller_store_fetch_errors_total` - Store lookups that failed, by kind
//! - `crypt_controller_requeues_total` - Keys requeued, by reason
//! - `crypt_controller_queue_depth` - Keys waiting in the work queue

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "crypt_controller_reconciliations_total",
        "Total number of convergence passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "crypt_controller_reconciliation_errors_total",
        "Total number of convergence passes that ended in an error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "crypt_controller_reconciliation_duration_seconds",
            "Duration of convergence passes in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static SECRETS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "crypt_controller_secrets_created_total",
        "Total number of target secrets created",
    )
    .expect("Failed to create SECRETS_CREATED_TOTAL metric - this should never happen")
});

static SECRETS_UPDATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "crypt_controller_secrets_updated_total",
        "Total number of target secrets replaced",
    )
    .expect("Failed to create SECRETS_UPDATED_TOTAL metric - this should never happen")
});

static SECRETS_DELETED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "crypt_controller_secrets_deleted_total",
        "Total number of target secrets deleted by cascade cleanup",
    )
    .expect("Failed to create SECRETS_DELETED_TOTAL metric - this should never happen")
});

static STORE_FETCH_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "crypt_controller_store_fetch_errors_total",
            "Total number of failed secret store lookups",
        ),
        &["backend", "kind"],
    )
    .expect("Failed to create STORE_FETCH_ERRORS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "crypt_controller_requeues_total",
            "Total number of work queue requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "crypt_controller_queue_depth",
        "Current number of keys waiting in the work queue",
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(SECRETS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRETS_UPDATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRETS_DELETED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_FETCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;

    Ok(())
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_secrets_created() {
    SECRETS_CREATED_TOTAL.inc();
}

pub fn increment_secrets_updated() {
    SECRETS_UPDATED_TOTAL.inc();
}

pub fn increment_secrets_deleted() {
    SECRETS_DELETED_TOTAL.inc();
}

pub fn increment_store_fetch_errors(backend: &str, kind: &str) {
    STORE_FETCH_ERRORS_TOTAL
        .with_label_values(&[backend, kind])
        .inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_rendered_once_registered() {
        // Registration may already have happened in another test
        let _ = register_metrics();
        increment_reconciliations();
        increment_store_fetch_errors("memory", "not_found");
        set_queue_depth(2);

        let text = gather_text().unwrap();
        assert!(text.contains("crypt_controller_reconciliations_total"));
        assert!(text.contains("crypt_controller_store_fetch_errors_total{backend=\"memory\",kind=\"not_found\"}"));
        assert!(text.contains("crypt_controller_queue_depth"));
    }
}
