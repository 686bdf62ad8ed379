//! Observability for segmentation passes
//!
//! Provides:
//! - Prometheus metrics (query latency, query failures, groups and runs)
//! - Structured logging of segmentation events with tracing

use crate::models::LabelKey;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for query latency (in seconds)
const QUERY_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SegmenterMetricsInner> = OnceLock::new();

struct SegmenterMetricsInner {
    query_latency_seconds: Histogram,
    queries_total: IntCounter,
    query_failures: IntCounterVec,
    groups_segmented: IntCounter,
    groups_skipped: IntCounter,
    runs_emitted: IntCounter,
}

impl SegmenterMetricsInner {
    fn new() -> Self {
        Self {
            query_latency_seconds: register_histogram!(
                "run_segmenter_query_latency_seconds",
                "Time spent waiting on the time-series service",
                QUERY_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register query_latency_seconds"),

            queries_total: register_int_counter!(
                "run_segmenter_queries_total",
                "Queries issued to the time-series service"
            )
            .expect("Failed to register queries_total"),

            query_failures: register_int_counter_vec!(
                "run_segmenter_query_failures_total",
                "Queries that failed, by failure kind",
                &["kind"]
            )
            .expect("Failed to register query_failures"),

            groups_segmented: register_int_counter!(
                "run_segmenter_groups_segmented_total",
                "Label groups that produced runs"
            )
            .expect("Failed to register groups_segmented"),

            groups_skipped: register_int_counter!(
                "run_segmenter_groups_skipped_total",
                "Label groups omitted for lack of fine-grained activity"
            )
            .expect("Failed to register groups_skipped"),

            runs_emitted: register_int_counter!(
                "run_segmenter_runs_emitted_total",
                "Runs designated across all label groups"
            )
            .expect("Failed to register runs_emitted"),
        }
    }
}

/// Handle to the process-wide segmenter metrics
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct SegmenterMetrics {
    _private: (),
}

impl Default for SegmenterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmenterMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SegmenterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SegmenterMetricsInner {
        GLOBAL_METRICS.get_or_init(SegmenterMetricsInner::new)
    }

    pub fn observe_query(&self, duration_secs: f64) {
        self.inner().queries_total.inc();
        self.inner().query_latency_seconds.observe(duration_secs);
    }

    pub fn inc_query_failures(&self, kind: &str) {
        self.inner().query_failures.with_label_values(&[kind]).inc();
    }

    pub fn inc_groups_segmented(&self) {
        self.inner().groups_segmented.inc();
    }

    pub fn inc_groups_skipped(&self) {
        self.inner().groups_skipped.inc();
    }

    pub fn add_runs_emitted(&self, count: u64) {
        self.inner().runs_emitted.inc_by(count);
    }

    pub fn queries_total(&self) -> u64 {
        self.inner().queries_total.get()
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Structured logger for segmentation events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    scope: String,
}

impl StructuredLogger {
    /// Create a logger; `scope` is typically the namespace being segmented
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn log_pass_started(&self, groups: usize, history_points: usize) {
        info!(
            event = "segmentation_started",
            scope = %self.scope,
            groups = groups,
            history_points = history_points,
            "Starting run segmentation"
        );
    }

    pub fn log_pass_finished(&self, groups: usize, runs: usize, elapsed_ms: u128) {
        info!(
            event = "segmentation_finished",
            scope = %self.scope,
            groups = groups,
            runs = runs,
            elapsed_ms = elapsed_ms,
            "Run segmentation complete"
        );
    }

    pub fn log_group_segmented(&self, group: &LabelKey, windows: usize, points: usize, runs: usize) {
        info!(
            event = "group_segmented",
            scope = %self.scope,
            group = %group,
            coarse_windows = windows,
            fine_points = points,
            runs = runs,
            "Designated runs for label group"
        );
    }

    pub fn log_group_skipped(&self, group: &LabelKey, points: usize, reason: &str) {
        warn!(
            event = "group_skipped",
            scope = %self.scope,
            group = %group,
            fine_points = points,
            reason = %reason,
            "Label group omitted from run table"
        );
    }

    pub fn log_fine_query_failed(
        &self,
        group: &LabelKey,
        window_start: f64,
        window_end: f64,
        query: &str,
        error: &str,
    ) {
        warn!(
            event = "fine_query_failed",
            scope = %self.scope,
            group = %group,
            window_start = window_start,
            window_end = window_end,
            query = %query,
            error = %error,
            "Fine-grained query failed, treating window as empty"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_collectors() {
        let metrics = SegmenterMetrics::new();
        let before = metrics.queries_total();

        metrics.clone().observe_query(0.2);
        metrics.inc_query_failures("timeout");
        metrics.inc_groups_segmented();
        metrics.inc_groups_skipped();
        metrics.add_runs_emitted(3);

        assert!(metrics.queries_total() > before);
        assert!(metrics.render().contains("run_segmenter_queries_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("batch");
        assert_eq!(logger.scope, "batch");
    }
}
