//! Prometheus metrics helpers for the eventlog pipeline.
//!
//! # Usage
//!
//! ```rust,ignore
//! use eventlog_core::metrics::{init_metrics, start_metrics_server};
//!
//! let handle = init_metrics();
//! start_metrics_server(9090, handle).await?;
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component (`ingest_`, `writer_`, `count_index_`)
//! - Suffix: `_total` for counters
//! - No labels; event-type cardinality is already served by `/stats`

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Submissions accepted and handed to the writer.
pub const INGEST_ACCEPTED: &str = "ingest_events_accepted_total";
/// Submissions rejected (unknown type, malformed path, writer down).
pub const INGEST_REJECTED: &str = "ingest_events_rejected_total";
/// Records written to the append log.
pub const WRITER_RECORDS: &str = "writer_records_written_total";
/// Partition files opened by the writer.
pub const WRITER_FILES_OPENED: &str = "writer_files_opened_total";
/// Fatal storage faults raised by the writer.
pub const WRITER_FAULTS: &str = "writer_faults_total";
/// 1 while the writer accepts records, 0 once it failed or stopped.
pub const WRITER_HEALTHY: &str = "writer_healthy";
/// Count index operations that failed and were skipped.
pub const COUNT_INDEX_FAILURES: &str = "count_index_failures_total";

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if a recorder is already installed.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_metrics();
    Some(handle)
}

/// Serve `/metrics` on `port` from a background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(())
}

/// Register metric descriptions. Safe to call more than once.
fn register_metrics() {
    describe_counter!(INGEST_ACCEPTED, "Submissions accepted into the append log");
    describe_counter!(INGEST_REJECTED, "Submissions rejected before storage");
    describe_counter!(WRITER_RECORDS, "Records appended to partition files");
    describe_counter!(WRITER_FILES_OPENED, "Partition files opened by the writer");
    describe_counter!(WRITER_FAULTS, "Unrecoverable storage faults");
    describe_gauge!(WRITER_HEALTHY, "Whether the append-log writer is accepting records");
    describe_counter!(
        COUNT_INDEX_FAILURES,
        "Count index updates or queries that failed"
    );
}

/// Increment a counter.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Set a gauge value.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_metrics_idempotent() {
        let handle1 = try_init_metrics();
        let handle2 = try_init_metrics();
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_helpers_without_recorder_do_not_panic() {
        increment(INGEST_ACCEPTED, 1);
        set_gauge(WRITER_HEALTHY, 1.0);
        register_metrics();
    }
}
