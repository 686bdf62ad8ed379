//! Time-series query service
//!
//! The segmenter talks to its metrics backend only through the
//! [`TimeSeriesService`] trait. [`PrometheusClient`] is the HTTP
//! implementation; tests substitute in-memory services.

mod http;
mod template;

pub use http::{PrometheusClient, PrometheusClientBuilder};
pub use template::{promql_duration, ActivityQuery, DEFAULT_ACTIVITY_METRIC};

use crate::error::QueryError;
use crate::models::{Series, TimeRange};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub use async_trait::async_trait;

/// Attempts made for a single-point instant query before giving up
pub const INSTANT_QUERY_ATTEMPTS: usize = 2;

/// Trait for time-series backends
#[async_trait]
pub trait TimeSeriesService: Send + Sync {
    /// Evaluate `query` at a single instant
    async fn instant_query(
        &self,
        query: &str,
        time: f64,
        timeout: Duration,
    ) -> Result<Vec<Series>, QueryError>;

    /// Evaluate `query` over a range at the given resolution
    async fn range_query(
        &self,
        query: &str,
        range: TimeRange,
        timeout: Duration,
    ) -> Result<Vec<Series>, QueryError>;
}

/// Run a query future, converting an elapsed deadline into [`QueryError::Timeout`]
pub async fn bounded<T, F>(query: &str, timeout: Duration, fut: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, QueryError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::Timeout {
            query: query.to_string(),
            timeout,
        }),
    }
}

/// Fetch a single value, retrying an empty or failed response once
///
/// Returns `Ok(None)` when the backend still has no data after the last
/// attempt. Malformed responses and API errors are returned immediately.
pub async fn instant_value_with_retry(
    service: &dyn TimeSeriesService,
    query: &str,
    time: f64,
    timeout: Duration,
) -> Result<Option<f64>, QueryError> {
    for attempt in 1..=INSTANT_QUERY_ATTEMPTS {
        match bounded(query, timeout, service.instant_query(query, time, timeout)).await {
            Ok(series) => {
                let value = series
                    .iter()
                    .flat_map(|s| s.samples.iter())
                    .map(|(_, v)| *v)
                    .next();
                if value.is_some() {
                    return Ok(value);
                }
                debug!(query = %query, attempt = attempt, "Instant query returned no data");
            }
            Err(e @ (QueryError::Timeout { .. } | QueryError::Transport { .. })) => {
                warn!(query = %query, attempt = attempt, error = %e, "Instant query failed");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LabelKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns scripted instant responses in order, then empty results
    struct ScriptedService {
        calls: AtomicUsize,
        responses: Vec<fn(&str) -> Result<Vec<Series>, QueryError>>,
    }

    #[async_trait]
    impl TimeSeriesService for ScriptedService {
        async fn instant_query(
            &self,
            query: &str,
            _time: f64,
            _timeout: Duration,
        ) -> Result<Vec<Series>, QueryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(call) {
                Some(respond) => respond(query),
                None => Ok(vec![]),
            }
        }

        async fn range_query(
            &self,
            _query: &str,
            _range: TimeRange,
            _timeout: Duration,
        ) -> Result<Vec<Series>, QueryError> {
            Ok(vec![])
        }
    }

    fn one_point(_: &str) -> Result<Vec<Series>, QueryError> {
        Ok(vec![Series {
            labels: LabelKey::new().with("pod", "job-1"),
            samples: vec![(100.0, 4.5)],
        }])
    }

    fn empty(_: &str) -> Result<Vec<Series>, QueryError> {
        Ok(vec![])
    }

    fn malformed(query: &str) -> Result<Vec<Series>, QueryError> {
        Err(QueryError::malformed(query, "missing data"))
    }

    fn timed_out(query: &str) -> Result<Vec<Series>, QueryError> {
        Err(QueryError::Timeout {
            query: query.to_string(),
            timeout: Duration::from_secs(1),
        })
    }

    fn service(responses: Vec<fn(&str) -> Result<Vec<Series>, QueryError>>) -> ScriptedService {
        ScriptedService {
            calls: AtomicUsize::new(0),
            responses,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_empty_response() {
        let svc = service(vec![empty, one_point]);
        let value = instant_value_with_retry(&svc, "q", 0.0, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(value, Some(4.5));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let svc = service(vec![empty, empty, one_point]);
        let value = instant_value_with_retry(&svc, "q", 0.0, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(value, None);
        assert_eq!(svc.calls.load(Ordering::SeqCst), INSTANT_QUERY_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_timeouts_fall_back_to_no_data() {
        let svc = service(vec![timed_out, timed_out]);
        let value = instant_value_with_retry(&svc, "q", 0.0, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let svc = service(vec![malformed, one_point]);
        let err = instant_value_with_retry(&svc, "rate(x[5m])", 0.0, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(err.query(), "rate(x[5m])");
        assert_eq!(svc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bounded_reports_timeout() {
        let err = bounded("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, QueryError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, QueryError::Timeout { .. }));
        assert_eq!(err.query(), "slow");
    }
}
