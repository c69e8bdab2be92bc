//! Worker metrics.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Metric name constants for consistency.
pub mod names {
    /// Jobs handed to the work queue.
    pub const JOBS_SUBMITTED_TOTAL: &str = "snd_jobs_submitted_total";

    /// Finished runs by outcome (succeeded, failed, skipped).
    pub const RUNS_TOTAL: &str = "snd_runs_total";

    /// Run duration in seconds by outcome.
    pub const RUN_DURATION_SECONDS: &str = "snd_run_duration_seconds";

    /// Stage failures by stage and kind (processing, unhandled).
    pub const STAGE_FAILURES_TOTAL: &str = "snd_stage_failures_total";
}

pub fn record_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_run(outcome: &'static str, duration_secs: f64) {
    counter!(names::RUNS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

pub fn record_stage_failure(stage: &'static str, kind: &'static str) {
    counter!(
        names::STAGE_FAILURES_TOTAL,
        "stage" => stage,
        "kind" => kind
    )
    .increment(1);
}
