//! Fine-grained activity queries
//!
//! For each coarse window, asks the time-series service for positive
//! activity at the fine timestep. Windows needing more samples than one
//! range query may return are split into consecutive sub-ranges. A failed
//! window is logged and treated as empty; it never aborts the other windows
//! or groups.

use crate::config::SegmenterConfig;
use crate::error::QueryError;
use crate::filter::LabelFilter;
use crate::models::{ActivityPoint, CoarsePeriod, TimeRange};
use crate::observability::{SegmenterMetrics, StructuredLogger};
use crate::query::{bounded, ActivityQuery, TimeSeriesService};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Activity collected for one label group
#[derive(Debug, Default)]
pub struct FineActivity {
    /// Positive samples from every window, in window order
    pub points: Vec<ActivityPoint>,
    /// Windows whose query failed or timed out
    pub failed_windows: usize,
}

impl FineActivity {
    /// Sorted, de-duplicated timestamps ready for run designation
    pub fn timestamps(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self.points.iter().map(|p| p.timestamp).collect();
        times.sort_by(f64::total_cmp);
        times.dedup();
        times
    }
}

/// Issues fine-grained queries for coarse windows
pub struct FinePeriodQuerier {
    service: Arc<dyn TimeSeriesService>,
    template: ActivityQuery,
    timestep: Duration,
    timeout: Duration,
    max_points_per_query: usize,
    metrics: SegmenterMetrics,
    logger: StructuredLogger,
}

impl FinePeriodQuerier {
    pub fn new(
        service: Arc<dyn TimeSeriesService>,
        filter: LabelFilter,
        config: &SegmenterConfig,
        logger: StructuredLogger,
    ) -> Self {
        let template = ActivityQuery::new(filter, config.timestep)
            .metric(config.activity_metric.clone())
            .group_by(config.group_by.clone());

        Self {
            service,
            template,
            timestep: config.timestep,
            timeout: config.query_timeout,
            max_points_per_query: config.max_points_per_query,
            metrics: SegmenterMetrics::new(),
            logger,
        }
    }

    /// Query one coarse window, split into sub-ranges the backend accepts
    pub async fn query_window(&self, period: &CoarsePeriod) -> Result<Vec<ActivityPoint>, QueryError> {
        let query = self.template.clone().for_group(&period.label_key).render();
        let ranges = split_range(
            period.start,
            period.end,
            self.timestep.as_secs_f64(),
            self.max_points_per_query,
        );

        let mut points = Vec::new();
        for range in ranges {
            let started = Instant::now();
            let result = bounded(
                &query,
                self.timeout,
                self.service.range_query(&query, range, self.timeout),
            )
            .await;
            self.metrics.observe_query(started.elapsed().as_secs_f64());

            points.extend(
                result?
                    .into_iter()
                    .flat_map(|s| s.samples.into_iter())
                    .filter(|(ts, v)| ts.is_finite() && v.is_finite() && *v > 0.0)
                    .map(|(ts, v)| ActivityPoint::new(period.label_key.clone(), ts, v)),
            );
        }

        Ok(points)
    }

    /// Query every coarse window of one group, concatenating the results
    pub async fn query_group(&self, periods: &[CoarsePeriod]) -> FineActivity {
        let mut activity = FineActivity::default();

        for period in periods {
            match self.query_window(period).await {
                Ok(points) => activity.points.extend(points),
                Err(e) => {
                    activity.failed_windows += 1;
                    self.metrics.inc_query_failures(e.kind());
                    self.logger.log_fine_query_failed(
                        &period.label_key,
                        period.start,
                        period.end,
                        e.query(),
                        &e.to_string(),
                    );
                }
            }
        }

        activity
    }
}

/// Split `[start, end]` into consecutive ranges of at most `max_points` samples
///
/// Sub-ranges stay on the `start + k * step` grid and never overlap.
fn split_range(start: f64, end: f64, step: f64, max_points: usize) -> Vec<TimeRange> {
    let span = step * max_points.saturating_sub(1).max(1) as f64;
    let mut ranges = Vec::new();
    let mut chunk_start = start;

    loop {
        let chunk_end = (chunk_start + span).min(end);
        ranges.push(TimeRange::new(chunk_start, chunk_end, step));
        chunk_start = chunk_end + step;
        if chunk_end >= end || chunk_start > end {
            break;
        }
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LabelKey, Series};
    use crate::query::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves samples falling inside the requested range; fails on marked windows
    struct WindowService {
        samples: Vec<(f64, f64)>,
        fail_starting_at: Option<f64>,
        seen: Mutex<Vec<(String, TimeRange)>>,
    }

    #[async_trait]
    impl TimeSeriesService for WindowService {
        async fn instant_query(
            &self,
            _query: &str,
            _time: f64,
            _timeout: Duration,
        ) -> Result<Vec<Series>, QueryError> {
            Ok(vec![])
        }

        async fn range_query(
            &self,
            query: &str,
            range: TimeRange,
            _timeout: Duration,
        ) -> Result<Vec<Series>, QueryError> {
            self.seen.lock().unwrap().push((query.to_string(), range));
            if self.fail_starting_at == Some(range.start) {
                return Err(QueryError::malformed(query, "missing data"));
            }
            let samples = self
                .samples
                .iter()
                .copied()
                .filter(|(ts, _)| *ts >= range.start && *ts <= range.end)
                .collect();
            Ok(vec![Series {
                labels: LabelKey::new().with("pod", "job-1"),
                samples,
            }])
        }
    }

    /// Never answers within any reasonable timeout
    struct StalledService;

    #[async_trait]
    impl TimeSeriesService for StalledService {
        async fn instant_query(
            &self,
            _query: &str,
            _time: f64,
            _timeout: Duration,
        ) -> Result<Vec<Series>, QueryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }

        async fn range_query(
            &self,
            _query: &str,
            _range: TimeRange,
            _timeout: Duration,
        ) -> Result<Vec<Series>, QueryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
    }

    /// Serves a sample every step, refusing ranges over `limit` points
    struct LimitedGridService {
        limit: usize,
        queries: AtomicUsize,
    }

    #[async_trait]
    impl TimeSeriesService for LimitedGridService {
        async fn instant_query(
            &self,
            _query: &str,
            _time: f64,
            _timeout: Duration,
        ) -> Result<Vec<Series>, QueryError> {
            Ok(vec![])
        }

        async fn range_query(
            &self,
            query: &str,
            range: TimeRange,
            _timeout: Duration,
        ) -> Result<Vec<Series>, QueryError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let points = ((range.end - range.start) / range.step).floor() as usize + 1;
            if points > self.limit {
                return Err(QueryError::Api {
                    query: query.to_string(),
                    message: "exceeded maximum resolution".to_string(),
                });
            }
            let samples = (0..points)
                .map(|k| (range.start + k as f64 * range.step, 1.0))
                .collect();
            Ok(vec![Series {
                labels: group(),
                samples,
            }])
        }
    }

    fn group() -> LabelKey {
        LabelKey::new().with("pod", "job-1")
    }

    fn period(start: f64, end: f64) -> CoarsePeriod {
        CoarsePeriod {
            label_key: group(),
            start,
            end,
        }
    }

    fn querier(service: Arc<dyn TimeSeriesService>, timeout: Duration) -> FinePeriodQuerier {
        let config = SegmenterConfig::default().with_query_timeout(timeout);
        FinePeriodQuerier::new(
            service,
            LabelFilter::namespace("batch").unwrap(),
            &config,
            StructuredLogger::new("batch"),
        )
    }

    #[tokio::test]
    async fn test_window_keeps_only_positive_samples() {
        let service = Arc::new(WindowService {
            samples: vec![(600.0, 0.5), (1200.0, 0.0), (1800.0, 2.0)],
            fail_starting_at: None,
            seen: Mutex::new(vec![]),
        });
        let fine = querier(service.clone(), Duration::from_secs(5));

        let points = fine.query_window(&period(0.0, 3600.0)).await.unwrap();
        let times: Vec<f64> = points.iter().map(|p| p.timestamp).collect();

        assert_eq!(times, vec![600.0, 1800.0]);
        assert!(points.iter().all(|p| p.label_key == group()));

        let seen = service.seen.lock().unwrap();
        assert_eq!(seen[0].1.step, 600.0);
        assert!(seen[0].0.contains(r#"pod="job-1""#));
        assert!(seen[0].0.contains(r#"namespace="batch""#));
    }

    #[tokio::test]
    async fn test_failed_window_does_not_abort_group() {
        let service = Arc::new(WindowService {
            samples: vec![(100.0, 1.0), (200.0, 1.0), (1_000_000.0, 1.0)],
            fail_starting_at: Some(0.0),
            seen: Mutex::new(vec![]),
        });
        let fine = querier(service.clone(), Duration::from_secs(5));

        let activity = fine
            .query_group(&[period(0.0, 500.0), period(900_000.0, 1_100_000.0)])
            .await;

        assert_eq!(activity.failed_windows, 1);
        assert_eq!(activity.timestamps(), vec![1_000_000.0]);
        assert_eq!(service.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stalled_window_times_out_as_empty() {
        let fine = querier(Arc::new(StalledService), Duration::from_millis(20));

        let activity = fine.query_group(&[period(0.0, 100.0)]).await;

        assert_eq!(activity.failed_windows, 1);
        assert!(activity.points.is_empty());
    }

    #[test]
    fn test_split_range_respects_point_limit() {
        let ranges = split_range(0.0, 60_000.0, 600.0, 11);

        assert_eq!(ranges.len(), 10);
        assert_eq!(ranges[0].end, 6000.0);
        assert_eq!(ranges[1].start, 6600.0);
        assert_eq!(ranges.last().unwrap().end, 60_000.0);

        let counts: Vec<usize> = ranges
            .iter()
            .map(|r| ((r.end - r.start) / r.step) as usize + 1)
            .collect();
        assert!(counts.iter().all(|c| *c <= 11));
        assert_eq!(counts.iter().sum::<usize>(), 101);
    }

    #[test]
    fn test_narrow_window_is_one_range() {
        let ranges = split_range(0.0, 100.0, 600.0, 11_000);
        assert_eq!(ranges, vec![TimeRange::new(0.0, 100.0, 600.0)]);
    }

    #[tokio::test]
    async fn test_wide_window_split_into_accepted_queries() {
        let service = Arc::new(LimitedGridService {
            limit: 11_000,
            queries: AtomicUsize::new(0),
        });
        let fine = querier(service.clone(), Duration::from_secs(5));

        // 90 days at a 10 minute step needs 12961 samples
        let activity = fine.query_group(&[period(0.0, 90.0 * 86_400.0)]).await;

        assert_eq!(activity.failed_windows, 0);
        assert_eq!(service.queries.load(Ordering::SeqCst), 2);
        let times = activity.timestamps();
        assert_eq!(times.len(), 12_961);
        assert_eq!(times.first(), Some(&0.0));
        assert_eq!(times.last(), Some(&7_776_000.0));
    }

    #[tokio::test]
    async fn test_configured_point_limit_used() {
        let service = Arc::new(LimitedGridService {
            limit: 5,
            queries: AtomicUsize::new(0),
        });
        let config = SegmenterConfig::default().with_max_points_per_query(5);
        let fine = FinePeriodQuerier::new(
            service.clone(),
            LabelFilter::namespace("batch").unwrap(),
            &config,
            StructuredLogger::new("batch"),
        );

        let points = fine.query_window(&period(0.0, 6000.0)).await.unwrap();

        assert_eq!(points.len(), 11);
        assert_eq!(service.queries.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_timestamps_sorted_and_deduplicated() {
        let activity = FineActivity {
            points: vec![
                ActivityPoint::new(group(), 1200.0, 1.0),
                ActivityPoint::new(group(), 600.0, 1.0),
                ActivityPoint::new(group(), 1200.0, 1.0),
            ],
            failed_windows: 0,
        };

        assert_eq!(activity.timestamps(), vec![600.0, 1200.0]);
    }
}
