//! Segmenter configuration

use crate::error::{SegmenterError, SegmenterResult};
use crate::models::DisplayMode;
use crate::query::DEFAULT_ACTIVITY_METRIC;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Default fine-grained query resolution (10 minutes)
pub const DEFAULT_TIMESTEP: Duration = Duration::from_secs(10 * 60);

/// Default minimum inactivity separating two runs (1 hour)
pub const DEFAULT_MIN_BREAK: Duration = Duration::from_secs(60 * 60);

/// Default bound on a single query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Most samples per series the backend returns for one range query
pub const DEFAULT_MAX_POINTS_PER_QUERY: usize = 11_000;

/// Configuration for a segmentation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Namespace the pods live in
    pub namespace: Option<String>,
    /// Resolution of fine-grained activity queries
    pub timestep: Duration,
    /// Minimum inactivity that starts a new run
    pub min_break: Duration,
    /// Bound on each query to the time-series service
    pub query_timeout: Duration,
    /// Presentation of run boundaries
    pub display_mode: DisplayMode,
    /// Counter whose increase marks activity
    pub activity_metric: String,
    /// Labels that identify a group
    pub group_by: Vec<String>,
    /// Label groups processed at the same time (1 = sequential)
    pub max_concurrent_groups: usize,
    /// Samples per series allowed in one range query; wider windows are split
    pub max_points_per_query: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            timestep: DEFAULT_TIMESTEP,
            min_break: DEFAULT_MIN_BREAK,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            display_mode: DisplayMode::Calendar,
            activity_metric: DEFAULT_ACTIVITY_METRIC.to_string(),
            group_by: vec!["pod".to_string()],
            max_concurrent_groups: 1,
            max_points_per_query: DEFAULT_MAX_POINTS_PER_QUERY,
        }
    }
}

impl SegmenterConfig {
    /// Check parameters before any query is issued
    ///
    /// Unusable values are errors. A timestep that is not smaller than the
    /// minimum break is allowed but logged, since gaps then go undetected.
    pub fn validate(&self) -> SegmenterResult<()> {
        if self.timestep.is_zero() {
            return Err(SegmenterError::config("timestep must be positive"));
        }
        if self.min_break.is_zero() {
            return Err(SegmenterError::config("min_break must be positive"));
        }
        if self.query_timeout.is_zero() {
            return Err(SegmenterError::config("query_timeout must be positive"));
        }
        if self.max_concurrent_groups == 0 {
            return Err(SegmenterError::config("max_concurrent_groups must be at least 1"));
        }
        if self.max_points_per_query < 2 {
            return Err(SegmenterError::config("max_points_per_query must be at least 2"));
        }
        if self.activity_metric.trim().is_empty() {
            return Err(SegmenterError::config("activity_metric must not be empty"));
        }

        if self.timestep >= self.min_break {
            warn!(
                timestep_secs = self.timestep.as_secs(),
                min_break_secs = self.min_break.as_secs(),
                "Timestep is not smaller than min_break; gap detection is unreliable"
            );
        }

        Ok(())
    }

    /// Builder-style setter for the namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_timestep(mut self, timestep: Duration) -> Self {
        self.timestep = timestep;
        self
    }

    pub fn with_min_break(mut self, min_break: Duration) -> Self {
        self.min_break = min_break;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_display_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = mode;
        self
    }

    pub fn with_max_concurrent_groups(mut self, count: usize) -> Self {
        self.max_concurrent_groups = count;
        self
    }

    pub fn with_max_points_per_query(mut self, points: usize) -> Self {
        self.max_points_per_query = points;
        self
    }
}
