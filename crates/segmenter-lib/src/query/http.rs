//! HTTP client for the Prometheus query API
//!
//! Implements [`TimeSeriesService`] against `/api/v1/query` and
//! `/api/v1/query_range`. Responses that lack the expected fields are
//! reported as [`QueryError::MalformedResponse`] naming the query, never
//! turned into empty or zero-valued series.

use super::{bounded, promql_duration, TimeSeriesService};
use crate::error::{QueryError, SegmenterError, SegmenterResult};
use crate::models::{LabelKey, Series, TimeRange};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default per-request timeout when none is configured
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Prometheus HTTP API client
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: Client,
    base_url: Url,
}

impl PrometheusClient {
    /// Create a client with default settings
    pub fn new(base_url: &str) -> SegmenterResult<Self> {
        PrometheusClientBuilder::new(base_url).build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn execute(
        &self,
        path: &str,
        query: &str,
        params: Vec<(&'static str, String)>,
        timeout: Duration,
    ) -> Result<Vec<Series>, QueryError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| QueryError::malformed(query, format!("invalid endpoint: {}", e)))?;

        debug!(url = %url, query = %query, "Issuing Prometheus query");

        let mut pairs = vec![("query", query.to_string())];
        pairs.extend(params);
        pairs.push(("timeout", promql_duration(timeout)));

        let response = self
            .client
            .get(url)
            .query(&pairs)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(query, timeout, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(query, timeout, e))?;

        decode_response(query, status.as_u16(), &body)
    }
}

#[async_trait]
impl TimeSeriesService for PrometheusClient {
    async fn instant_query(
        &self,
        query: &str,
        time: f64,
        timeout: Duration,
    ) -> Result<Vec<Series>, QueryError> {
        let params = vec![("time", time.to_string())];
        bounded(query, timeout, self.execute("api/v1/query", query, params, timeout)).await
    }

    async fn range_query(
        &self,
        query: &str,
        range: TimeRange,
        timeout: Duration,
    ) -> Result<Vec<Series>, QueryError> {
        let params = vec![
            ("start", range.start.to_string()),
            ("end", range.end.to_string()),
            ("step", range.step.to_string()),
        ];
        bounded(
            query,
            timeout,
            self.execute("api/v1/query_range", query, params, timeout),
        )
        .await
    }
}

/// Builder for [`PrometheusClient`]
pub struct PrometheusClientBuilder {
    base_url: String,
    request_timeout: Duration,
}

impl PrometheusClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Upper bound applied to every request by the HTTP client itself
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> SegmenterResult<PrometheusClient> {
        let mut raw = self.base_url;
        if !raw.ends_with('/') {
            raw.push('/');
        }

        let base_url = Url::parse(&raw).map_err(|e| {
            SegmenterError::config(format!("invalid Prometheus URL {:?}: {}", raw, e))
        })?;

        let client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| SegmenterError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(PrometheusClient { client, base_url })
    }
}

fn transport_error(query: &str, timeout: Duration, error: reqwest::Error) -> QueryError {
    if error.is_timeout() {
        QueryError::Timeout {
            query: query.to_string(),
            timeout,
        }
    } else {
        QueryError::Transport {
            query: query.to_string(),
            source: error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    metric: BTreeMap<String, String>,
    values: Vec<(f64, String)>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

/// Decode a Prometheus API body into labeled series
fn decode_response(query: &str, status: u16, body: &str) -> Result<Vec<Series>, QueryError> {
    let response: ApiResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) if (200..300).contains(&status) => {
            return Err(QueryError::malformed(query, format!("undecodable body: {}", e)));
        }
        Err(_) => {
            return Err(QueryError::Api {
                query: query.to_string(),
                message: format!("HTTP {}: {}", status, body.trim()),
            });
        }
    };

    if response.status != "success" {
        let message = match (response.error_type, response.error) {
            (Some(kind), Some(msg)) => format!("{}: {}", kind, msg),
            (None, Some(msg)) => msg,
            _ => format!("status {:?} (HTTP {})", response.status, status),
        };
        return Err(QueryError::Api {
            query: query.to_string(),
            message,
        });
    }

    let data = response
        .data
        .ok_or_else(|| QueryError::malformed(query, "missing \"data\" field"))?;

    match data.result_type.as_str() {
        "matrix" => {
            let series: Vec<MatrixSeries> = serde_json::from_value(data.result)
                .map_err(|e| QueryError::malformed(query, format!("bad matrix result: {}", e)))?;
            series
                .into_iter()
                .map(|s| {
                    let samples = s
                        .values
                        .iter()
                        .map(|(ts, v)| parse_sample(query, *ts, v))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Series {
                        labels: labels_from_metric(s.metric),
                        samples,
                    })
                })
                .collect()
        }
        "vector" => {
            let samples: Vec<VectorSample> = serde_json::from_value(data.result)
                .map_err(|e| QueryError::malformed(query, format!("bad vector result: {}", e)))?;
            samples
                .into_iter()
                .map(|s| {
                    Ok(Series {
                        labels: labels_from_metric(s.metric),
                        samples: vec![parse_sample(query, s.value.0, &s.value.1)?],
                    })
                })
                .collect()
        }
        "scalar" => {
            let (ts, v): (f64, String) = serde_json::from_value(data.result)
                .map_err(|e| QueryError::malformed(query, format!("bad scalar result: {}", e)))?;
            Ok(vec![Series {
                labels: LabelKey::new(),
                samples: vec![parse_sample(query, ts, &v)?],
            }])
        }
        other => Err(QueryError::malformed(
            query,
            format!("unsupported result type {:?}", other),
        )),
    }
}

fn parse_sample(query: &str, timestamp: f64, value: &str) -> Result<(f64, f64), QueryError> {
    let parsed = value
        .parse::<f64>()
        .map_err(|_| QueryError::malformed(query, format!("non-numeric sample value {:?}", value)))?;
    Ok((timestamp, parsed))
}

fn labels_from_metric(metric: BTreeMap<String, String>) -> LabelKey {
    LabelKey::from_pairs(metric.into_iter().filter(|(name, _)| name != "__name__"))
}
