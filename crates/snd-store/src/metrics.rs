//! Store metrics collection.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total store operations by operation and status.
    pub const OPERATIONS_TOTAL: &str = "snd_store_operations_total";

    /// Operation latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "snd_store_latency_seconds";

    /// Lease acquisitions by outcome.
    pub const LEASES_TOTAL: &str = "snd_store_leases_total";
}

/// Record a completed store operation.
pub fn record_operation(operation: &'static str, ok: bool, latency_secs: f64) {
    counter!(
        names::OPERATIONS_TOTAL,
        "operation" => operation,
        "status" => if ok { "ok" } else { "error" }
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation).record(latency_secs);
}

/// Record a lease acquisition attempt.
pub fn record_lease(acquired: bool) {
    counter!(
        names::LEASES_TOTAL,
        "outcome" => if acquired { "acquired" } else { "busy" }
    )
    .increment(1);
}
