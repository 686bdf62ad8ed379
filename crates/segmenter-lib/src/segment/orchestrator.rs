//! Segmentation orchestrator
//!
//! Drives every label group through coarse windows, fine queries and run
//! designation, then assembles one sorted run table. Groups share no state
//! and run as independent tasks, bounded by `max_concurrent_groups`.

use super::coarse::{find_coarse_periods, group_timestamps, PAD_SECS};
use super::designator::{designate_runs, RunParams};
use super::fine::FinePeriodQuerier;
use super::progress::{Progress, ProgressReporter};
use crate::config::SegmenterConfig;
use crate::error::SegmenterResult;
use crate::filter::LabelFilter;
use crate::models::{ActivityPoint, LabelKey, Run, TimeRange};
use crate::observability::{SegmenterMetrics, StructuredLogger};
use crate::query::{bounded, ActivityQuery, TimeSeriesService};
use crate::table::RunTable;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info};

/// Pipeline state of one label group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// No activity days were found
    NoHistory,
    /// Coarse windows derived from the history
    CoarseFound { windows: usize },
    /// Fine-grained activity collected; terminal when too few points remain
    FineQueried { points: usize },
    /// Runs designated
    RunsDesignated { runs: usize },
}

/// Result of driving one label group through the pipeline
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub group: LabelKey,
    pub state: GroupState,
    pub runs: Vec<Run>,
    pub failed_windows: usize,
}

/// Run segmenter over a time-series service
pub struct RunSegmenter {
    service: Arc<dyn TimeSeriesService>,
    config: SegmenterConfig,
    metrics: SegmenterMetrics,
    logger: StructuredLogger,
    progress: Option<Arc<dyn ProgressReporter>>,
}

impl RunSegmenter {
    /// Create a segmenter, validating the configuration up front
    pub fn new(service: Arc<dyn TimeSeriesService>, config: SegmenterConfig) -> SegmenterResult<Self> {
        config.validate()?;
        let scope = config.namespace.clone().unwrap_or_else(|| "cluster".to_string());

        Ok(Self {
            service,
            config,
            metrics: SegmenterMetrics::new(),
            logger: StructuredLogger::new(scope),
            progress: None,
        })
    }

    /// Report progress after each label group
    pub fn with_progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(reporter);
        self
    }

    fn run_params(&self) -> RunParams {
        RunParams::new(
            self.config.min_break.as_secs_f64(),
            self.config.timestep.as_secs_f64(),
        )
    }

    fn activity_query(&self, filter: &LabelFilter, window: Duration) -> ActivityQuery {
        ActivityQuery::new(filter.clone(), window)
            .metric(self.config.activity_metric.clone())
            .group_by(self.config.group_by.clone())
    }

    /// Query the daily activity history for every group matching `filter`
    pub async fn query_history(
        &self,
        filter: &LabelFilter,
        start: f64,
        end: f64,
    ) -> SegmenterResult<Vec<ActivityPoint>> {
        let query = self
            .activity_query(filter, Duration::from_secs_f64(PAD_SECS))
            .render();
        let range = TimeRange::new(start, end, PAD_SECS);
        let timeout = self.config.query_timeout;

        let started = Instant::now();
        let result = bounded(&query, timeout, self.service.range_query(&query, range, timeout)).await;
        self.metrics.observe_query(started.elapsed().as_secs_f64());

        let series = result.map_err(|e| {
            self.metrics.inc_query_failures(e.kind());
            e
        })?;

        let history: Vec<ActivityPoint> = series
            .into_iter()
            .flat_map(|s| {
                let labels = s.labels;
                s.samples
                    .into_iter()
                    .filter(|(_, v)| *v > 0.0)
                    .map(move |(ts, v)| ActivityPoint::new(labels.clone(), ts, v))
            })
            .collect();

        debug!(query = %query, points = history.len(), "Fetched activity history");
        Ok(history)
    }

    /// Find runs for every group matching `filter` between `start` and `end`
    pub async fn find_runs(&self, filter: &LabelFilter, start: f64, end: f64) -> SegmenterResult<RunTable> {
        let history = self.query_history(filter, start, end).await?;
        self.segment_history(filter, &history).await
    }

    /// Segment a pre-fetched activity history into runs
    pub async fn segment_history(
        &self,
        filter: &LabelFilter,
        history: &[ActivityPoint],
    ) -> SegmenterResult<RunTable> {
        if history.is_empty() {
            info!("No activity history; returning empty run table");
            return Ok(RunTable::new(Vec::new(), self.config.display_mode));
        }

        let started = Instant::now();
        let groups = group_timestamps(history);
        let total = groups.len();
        self.logger.log_pass_started(total, history.len());

        let querier = Arc::new(FinePeriodQuerier::new(
            self.service.clone(),
            filter.clone(),
            &self.config,
            self.logger.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_groups));
        let params = self.run_params();

        let mut tasks = JoinSet::new();
        let mut task_groups: HashMap<Id, LabelKey> = HashMap::with_capacity(total);
        for (group, times) in groups {
            let querier = querier.clone();
            let semaphore = semaphore.clone();
            let logger = self.logger.clone();
            let metrics = self.metrics.clone();
            let key = group.clone();

            let handle = tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                segment_group(&querier, group, &times, params, &logger, &metrics).await
            });
            task_groups.insert(handle.id(), key);
        }

        let mut runs = Vec::new();
        let mut completed = 0;
        while let Some(joined) = tasks.join_next_with_id().await {
            completed += 1;
            let group = match joined {
                Ok((id, outcome)) => {
                    task_groups.remove(&id);
                    runs.extend(outcome.runs);
                    outcome.group
                }
                Err(e) => {
                    let group = task_groups.remove(&e.id()).unwrap_or_default();
                    self.metrics.inc_groups_skipped();
                    error!(group = %group, error = %e, "Label group task failed; group omitted");
                    group
                }
            };

            if let Some(reporter) = &self.progress {
                reporter.report(Progress {
                    completed,
                    total,
                    group,
                });
            }
        }

        let table = RunTable::new(runs, self.config.display_mode);
        self.logger
            .log_pass_finished(total, table.len(), started.elapsed().as_millis());
        Ok(table)
    }
}

/// Drive one label group from history to runs
pub async fn segment_group(
    querier: &FinePeriodQuerier,
    group: LabelKey,
    history: &[f64],
    params: RunParams,
    logger: &StructuredLogger,
    metrics: &SegmenterMetrics,
) -> GroupOutcome {
    let mut outcome = GroupOutcome {
        group,
        state: GroupState::NoHistory,
        runs: Vec::new(),
        failed_windows: 0,
    };

    let periods = find_coarse_periods(&outcome.group, history);
    if periods.is_empty() {
        debug!(group = %outcome.group, "No activity history for group");
        return outcome;
    }
    outcome.state = GroupState::CoarseFound {
        windows: periods.len(),
    };

    let activity = querier.query_group(&periods).await;
    outcome.failed_windows = activity.failed_windows;
    let times = activity.timestamps();
    outcome.state = GroupState::FineQueried { points: times.len() };

    if let Some(runs) = designate_group(&outcome.group, &times, periods.len(), params, logger, metrics) {
        outcome.state = GroupState::RunsDesignated { runs: runs.len() };
        outcome.runs = runs;
    }

    outcome
}

/// Designate one group's runs from sorted, de-duplicated fine timestamps
///
/// A group that cannot be segmented is logged, counted, and yields `None`.
fn designate_group(
    group: &LabelKey,
    times: &[f64],
    windows: usize,
    params: RunParams,
    logger: &StructuredLogger,
    metrics: &SegmenterMetrics,
) -> Option<Vec<Run>> {
    let intervals = match designate_runs(times, params) {
        Ok(intervals) => intervals,
        Err(e) => {
            metrics.inc_groups_skipped();
            logger.log_group_skipped(group, times.len(), &e.to_string());
            return None;
        }
    };

    let runs: Vec<Run> = intervals
        .into_iter()
        .map(|i| Run::new(group.clone(), i.start, i.end))
        .collect();

    metrics.inc_groups_segmented();
    metrics.add_runs_emitted(runs.len() as u64);
    logger.log_group_segmented(group, windows, times.len(), runs.len());

    Some(runs)
}

/// Segment a history that is already at fine resolution, without querying
///
/// Every group's samples are used directly as its fine timestamps.
pub fn segment_fine_history(points: &[ActivityPoint], config: &SegmenterConfig) -> SegmenterResult<RunTable> {
    config.validate()?;
    let scope = config.namespace.clone().unwrap_or_else(|| "offline".to_string());
    let logger = StructuredLogger::new(scope);
    let metrics = SegmenterMetrics::new();
    let params = RunParams::new(config.min_break.as_secs_f64(), config.timestep.as_secs_f64());

    let groups = group_timestamps(points);
    logger.log_pass_started(groups.len(), points.len());
    let started = Instant::now();

    let mut runs = Vec::new();
    let total = groups.len();
    for (group, mut times) in groups {
        times.retain(|t| t.is_finite());
        times.sort_by(f64::total_cmp);
        times.dedup();

        if let Some(group_runs) = designate_group(&group, &times, 0, params, &logger, &metrics) {
            runs.extend(group_runs);
        }
    }

    let table = RunTable::new(runs, config.display_mode);
    logger.log_pass_finished(total, table.len(), started.elapsed().as_millis());
    Ok(table)
}
