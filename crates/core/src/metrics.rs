//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job lifecycle (enqueues, status transitions, failures)
//! - Transfers (bytes moved, retries)
//! - Stage durations
//! - Restores and host shutdown

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Job Lifecycle Metrics
// =============================================================================

/// Jobs enqueued total.
pub static JOBS_ENQUEUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("recast_jobs_enqueued_total", "Total jobs enqueued").unwrap()
});

/// Status transitions total by target status.
pub static JOB_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "recast_job_transitions_total",
            "Total job status transitions",
        ),
        &["to"],
    )
    .unwrap()
});

/// Failed jobs total by error kind.
pub static JOB_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("recast_job_failures_total", "Total jobs that failed"),
        &["kind"], // "transient_transfer", "encoded_larger", ...
    )
    .unwrap()
});

// =============================================================================
// Transfer Metrics
// =============================================================================

/// Bytes moved total by direction.
pub static TRANSFER_BYTES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("recast_transfer_bytes_total", "Total bytes transferred"),
        &["direction"], // "download", "upload"
    )
    .unwrap()
});

/// Retried transfer attempts by operation.
pub static TRANSFER_RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "recast_transfer_retries_total",
            "Total transfer attempts that were retried",
        ),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Stage Metrics
// =============================================================================

/// Stage duration in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("recast_stage_duration_seconds", "Duration of pipeline stages")
            .buckets(vec![
                1.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0, 21600.0,
            ]),
        &["stage", "result"], // stage: "download", "encode", "upload"; result: "success", "failed"
    )
    .unwrap()
});

// =============================================================================
// Restore & Shutdown Metrics
// =============================================================================

/// Restores total by source and result.
pub static RESTORES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("recast_restores_total", "Total restore operations"),
        &["source", "result"],
    )
    .unwrap()
});

/// Host shutdowns triggered after the queue drained.
pub static HOST_SHUTDOWNS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "recast_host_shutdowns_total",
        "Total host shutdowns triggered",
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_ENQUEUED.clone()),
        Box::new(JOB_TRANSITIONS.clone()),
        Box::new(JOB_FAILURES.clone()),
        // Transfers
        Box::new(TRANSFER_BYTES.clone()),
        Box::new(TRANSFER_RETRIES_TOTAL.clone()),
        // Stages
        Box::new(STAGE_DURATION.clone()),
        // Restore & shutdown
        Box::new(RESTORES_TOTAL.clone()),
        Box::new(HOST_SHUTDOWNS.clone()),
    ]
}
