//! Prometheus metrics for the reservation service and the dispatch workers.
//!
//! Recorders are plain functions over the `metrics` facade; without an
//! installed recorder (unit tests) they are no-ops.
//!
//! # Example
//!
//! ```rust,no_run
//! use tradew_inventory_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tradew_inventory_core::DispatchKind;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics recorder
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping. Must be
/// started from within a tokio runtime.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP exporter.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or a recorder is already
    /// installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        let addr = self.addr;
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!(%addr, "Metrics exporter stopped");
            }
        });

        tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
        self.handle = Some(handle);
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "inventory_items_created_total",
        "Total number of item stacks created"
    );
    describe_counter!(
        "inventory_items_locked_total",
        "Total number of locks taken on item stacks"
    );
    describe_counter!(
        "inventory_trades_settled_total",
        "Total number of trades settled"
    );
    describe_counter!(
        "inventory_conflicts_total",
        "Total number of optimistic concurrency conflicts seen by the service"
    );
    describe_counter!(
        "item_store_conflicts_total",
        "Total number of storage transactions rolled back on a version conflict"
    );

    describe_counter!(
        "dispatch_events_published_total",
        "Total number of outbox events acknowledged by the broker"
    );
    describe_counter!(
        "dispatch_publish_errors_total",
        "Total number of outbox publish failures"
    );
    describe_counter!(
        "dispatch_status_flip_errors_total",
        "Published events whose items could not be marked available (duplicate-delivery risk)"
    );
    describe_histogram!(
        "dispatch_run_duration_seconds",
        "Time taken by one dispatch run"
    );

    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!(
        "retry_successes_total",
        "Total number of operations that succeeded after retrying"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted their retries"
    );
}

/// Reservation service metrics recorder.
pub struct InventoryMetrics;

impl InventoryMetrics {
    /// Record created stacks.
    pub fn record_created(count: usize) {
        counter!("inventory_items_created_total").increment(count as u64);
    }

    /// Record new locks.
    pub fn record_locked(count: usize) {
        counter!("inventory_items_locked_total").increment(count as u64);
    }

    /// Record a settled trade.
    pub fn record_trade_settled() {
        counter!("inventory_trades_settled_total").increment(1);
    }

    /// Record a version conflict.
    pub fn record_conflict(operation: &'static str) {
        counter!("inventory_conflicts_total", "operation" => operation).increment(1);
    }
}

/// Dispatch worker metrics recorder.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record an acknowledged event.
    pub fn record_published(kind: DispatchKind) {
        counter!("dispatch_events_published_total", "kind" => kind.as_str()).increment(1);
    }

    /// Record a publish failure.
    pub fn record_publish_error(kind: DispatchKind) {
        counter!("dispatch_publish_errors_total", "kind" => kind.as_str()).increment(1);
    }

    /// Record a failed status flip after a successful publish.
    pub fn record_status_flip_error(kind: DispatchKind) {
        counter!("dispatch_status_flip_errors_total", "kind" => kind.as_str()).increment(1);
    }

    /// Record the duration of a run.
    pub fn record_run(kind: DispatchKind, duration: Duration) {
        histogram!("dispatch_run_duration_seconds", "kind" => kind.as_str())
            .record(duration.as_secs_f64());
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}
