//! Prometheus connectivity check

use anyhow::{Context, Result};
use chrono::Utc;
use segmenter_lib::query::{instant_value_with_retry, PrometheusClientBuilder};
use segmenter_lib::SegmenterConfig;

use crate::config::CliConfig;
use crate::output::{print_success, print_warning, OutputFormat};
use crate::FilterArgs;

/// Count the series matching the label filter right now
pub async fn check_connection(
    settings: &CliConfig,
    prometheus_url: &str,
    filter: &FilterArgs,
    config: SegmenterConfig,
    format: OutputFormat,
) -> Result<()> {
    config.validate()?;
    let label_filter = settings.label_filter(filter)?;
    let client = PrometheusClientBuilder::new(prometheus_url)
        .request_timeout(config.query_timeout)
        .build()
        .context("Failed to create Prometheus client")?;

    let query = format!("count({}{{{}}})", config.activity_metric, label_filter.selector());
    let now = Utc::now().timestamp() as f64;
    let count = instant_value_with_retry(&client, &query, now, config.query_timeout)
        .await
        .with_context(|| format!("Failed to query {}", prometheus_url))?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "prometheus_url": prometheus_url,
                "query": query,
                "matching_series": count.unwrap_or(0.0),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => match count {
            Some(count) => print_success(&format!(
                "{} reachable, {} series of {} match",
                prometheus_url, count, config.activity_metric
            )),
            None => print_warning(&format!(
                "{} returned no series of {} for this filter",
                prometheus_url, config.activity_metric
            )),
        },
    }

    Ok(())
}
