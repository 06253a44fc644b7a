//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Step launches (immediate vs deferred, failures)
//! - Job polling and terminal outcomes
//! - Cancellation requests
//! - Pipeline runs

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Launch Metrics
// =============================================================================

/// Step launches by step and mode.
pub static STEP_LAUNCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enrich_step_launches_total", "Total step launches"),
        &["step", "mode"], // "immediate", "deferred", "failed"
    )
    .unwrap()
});

/// Launches rejected because the step already had a job in flight.
pub static LAUNCHES_REJECTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "enrich_launches_rejected_total",
        "Launches rejected because the step was already active",
    )
    .unwrap()
});

// =============================================================================
// Polling Metrics
// =============================================================================

/// Status requests by result.
pub static POLL_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enrich_poll_requests_total", "Total job status requests"),
        &["result"], // "ok", "transient_error"
    )
    .unwrap()
});

/// Jobs that reached a terminal phase.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enrich_jobs_finished_total", "Jobs that reached a terminal phase"),
        &["step", "phase"], // "completed", "stopped", "error"
    )
    .unwrap()
});

/// Wall-clock time from first poll to terminal phase.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("enrich_job_duration_seconds", "Duration of background jobs")
            .buckets(vec![
                1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 14400.0,
            ]),
        &["step", "phase"],
    )
    .unwrap()
});

/// Poll loops that stopped watching before a terminal phase.
pub static POLLERS_ABANDONED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "enrich_pollers_abandoned_total",
        "Poll loops torn down before the job finished",
    )
    .unwrap()
});

// =============================================================================
// Cancellation Metrics
// =============================================================================

/// Cancellation requests by result.
pub static CANCEL_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enrich_cancel_requests_total", "Total job cancellation requests"),
        &["result"], // "accepted", "rejected", "failed"
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Pipeline runs by outcome.
pub static PIPELINE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enrich_pipeline_runs_total", "Total pipeline runs"),
        &["outcome"], // "finished", "aborted", "reset"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Launch
        Box::new(STEP_LAUNCHES.clone()),
        Box::new(LAUNCHES_REJECTED.clone()),
        // Polling
        Box::new(POLL_REQUESTS.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(POLLERS_ABANDONED.clone()),
        // Cancellation
        Box::new(CANCEL_REQUESTS.clone()),
        // Pipeline
        Box::new(PIPELINE_RUNS.clone()),
    ]
}
