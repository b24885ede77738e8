//! Prometheus metrics for the lorry server.
//!
//! Exposes counters for package transactions, content store deduplication and
//! post-commit cleanup.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! Restrict it at the network level in deployments.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Package transactions
pub static PACKAGES_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("lorry_packages_created_total", "Total packages created")
        .expect("metric creation failed")
});

pub static PACKAGES_UPDATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("lorry_packages_updated_total", "Total package updates committed")
        .expect("metric creation failed")
});

pub static PACKAGES_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("lorry_packages_deleted_total", "Total packages deleted")
        .expect("metric creation failed")
});

pub static TRANSACTIONS_REJECTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lorry_transactions_rejected_total",
            "Package transactions rolled back, by operation and reason",
        ),
        &["operation", "reason"],
    )
    .expect("metric creation failed")
});

pub static TRANSACTION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "lorry_transaction_duration_seconds",
            "Time from validation to commit or rollback of a package transaction",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["operation"],
    )
    .expect("metric creation failed")
});

// Content store
pub static BLOBS_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("lorry_blobs_stored_total", "Blobs written to the content store")
        .expect("metric creation failed")
});

pub static BLOBS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "lorry_blobs_deduplicated_total",
        "Ingested files whose blob already existed",
    )
    .expect("metric creation failed")
});

pub static BYTES_INGESTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("lorry_bytes_ingested_total", "Bytes of uploaded files accepted into the content store")
        .expect("metric creation failed")
});

pub static BLOBS_REMOVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("lorry_blobs_removed_total", "Unreferenced blobs deleted")
        .expect("metric creation failed")
});

pub static BLOB_REMOVALS_SKIPPED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "lorry_blob_removals_skipped_total",
        "Blob removals skipped because an upload held the digest",
    )
    .expect("metric creation failed")
});

// Post-commit cleanup
pub static TAGS_COLLECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("lorry_tags_collected_total", "Orphaned tags deleted")
        .expect("metric creation failed")
});

pub static CLEANUP_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lorry_cleanup_failures_total",
            "Post-commit cleanup steps that failed and were skipped",
        ),
        &["step"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(PACKAGES_CREATED.clone()),
            Box::new(PACKAGES_UPDATED.clone()),
            Box::new(PACKAGES_DELETED.clone()),
            Box::new(TRANSACTIONS_REJECTED.clone()),
            Box::new(TRANSACTION_DURATION.clone()),
            Box::new(BLOBS_STORED.clone()),
            Box::new(BLOBS_DEDUPLICATED.clone()),
            Box::new(BYTES_INGESTED.clone()),
            Box::new(BLOBS_REMOVED.clone()),
            Box::new(BLOB_REMOVALS_SKIPPED.clone()),
            Box::new(TAGS_COLLECTED.clone()),
            Box::new(CLEANUP_FAILURES.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// Handler for the /metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a rolled back package transaction.
pub fn record_rejection(operation: &str, reason: &str) {
    TRANSACTIONS_REJECTED
        .with_label_values(&[operation, reason])
        .inc();
}

/// Record a failed post-commit cleanup step.
pub fn record_cleanup_failure(step: &str) {
    CLEANUP_FAILURES.with_label_values(&[step]).inc();
}
