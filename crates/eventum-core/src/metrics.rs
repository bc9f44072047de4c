//! Prometheus metrics helpers for Eventum.
//!
//! # Usage
//!
//! ```rust,ignore
//! use eventum_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     metrics::counter!("ingest_events_received_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component (`ingest_`, `staging_`, `groups_`, `recovery_`)
//! - Suffix: unit or type (`_total`, `_seconds`)

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_common_metrics();
    Some(handle)
}

/// Serve `/metrics` on the given port from a background task.
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
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for the pipeline metrics.
fn register_common_metrics() {
    // =========================================================================
    // Consume loop
    // =========================================================================

    describe_counter!(
        "ingest_events_received_total",
        "Messages read from the event topic"
    );
    describe_counter!(
        "ingest_events_persisted_total",
        "Events durably recorded in a file group (label: outcome)"
    );
    describe_counter!(
        "ingest_events_failed_total",
        "Events dropped by the consume loop (label: stage)"
    );
    describe_counter!(
        "ingest_events_dead_lettered_total",
        "Events written to the dead-letter file"
    );
    describe_gauge!(
        "ingest_running",
        "Whether the consume loop is running (1=yes, 0=no)"
    );
    describe_histogram!(
        "ingest_event_duration_seconds",
        "Time from decode to cleanup for one event"
    );

    // =========================================================================
    // Backing stores
    // =========================================================================

    describe_counter!(
        "staging_cleanup_errors_total",
        "Staged copies that could not be deleted after persistence"
    );
    describe_counter!(
        "store_retries_total",
        "Retried store operations after a transient error (label: op)"
    );

    // =========================================================================
    // Startup recovery
    // =========================================================================

    describe_counter!(
        "recovery_events_total",
        "Orphaned staged copies found at startup"
    );
    describe_counter!(
        "recovery_events_persisted_total",
        "Orphaned staged copies persisted and cleared at startup"
    );
}

/// Increment a counter.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Increment a counter carrying one label.
#[inline]
pub fn increment_labeled(
    name: &'static str,
    label: &'static str,
    value: &'static str,
    count: u64,
) {
    metrics::counter!(name, label => value).increment(count);
}

/// Set a gauge value.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_metrics_init() {
        INIT.call_once(|| {
            let _ = try_init_metrics();
        });
    }

    #[test]
    fn test_try_init_metrics_idempotent() {
        let handle1 = try_init_metrics();
        let handle2 = try_init_metrics();

        // At most one should succeed
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_increment_does_not_panic() {
        ensure_metrics_init();
        increment("test_counter", 0);
        increment("test_counter", 1);
        increment_labeled("test_labeled_total", "stage", "persist", 3);
    }

    #[test]
    fn test_set_gauge_does_not_panic() {
        ensure_metrics_init();
        set_gauge("test_gauge", 0.0);
        set_gauge("test_gauge", 1.0);
        set_gauge("test_gauge", f64::MAX);
    }

    #[test]
    fn test_register_common_metrics_does_not_panic() {
        ensure_metrics_init();
        register_common_metrics();
        register_common_metrics();
    }
}
