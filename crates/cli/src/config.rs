//! Configuration management for the CLI

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use segmenter_lib::{
    table::parse_timestamp, DisplayMode, LabelFilter, SegmenterConfig,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::{FilterArgs, TuningArgs, WindowArgs};

const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";

/// CLI configuration read from `~/.config/kseg/config.toml` and `KSEG_*`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    /// Prometheus server URL
    pub prometheus_url: Option<String>,
    /// Default namespace
    pub namespace: Option<String>,
    /// Default fine query resolution (e.g. "10m")
    pub timestep: Option<String>,
    /// Default minimum break (e.g. "1h")
    pub min_break: Option<String>,
    /// Default per-query timeout (e.g. "60s")
    pub query_timeout: Option<String>,
    /// Default activity metric
    pub activity_metric: Option<String>,
    /// Default number of label groups segmented concurrently
    pub max_concurrent_groups: Option<usize>,
}

impl CliConfig {
    /// Load configuration from the optional file and environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = Self::config_path() {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("KSEG"))
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("kseg").join("config.toml"))
    }

    /// Prometheus URL from the flag, then configuration, then the default
    pub fn prometheus_url(&self, flag: Option<&str>) -> String {
        flag.map(String::from)
            .or_else(|| self.prometheus_url.clone())
            .unwrap_or_else(|| DEFAULT_PROMETHEUS_URL.to_string())
    }

    /// Build the label filter, falling back to the configured namespace
    pub fn label_filter(&self, args: &FilterArgs) -> Result<LabelFilter> {
        let mut builder = LabelFilter::builder();

        if let Some(namespace) = args.namespace.as_ref().or(self.namespace.as_ref()) {
            builder = builder.namespace(namespace.clone());
        }
        if let Some(pod) = &args.pod {
            builder = builder.pod(pod.clone());
        }
        if let Some(pattern) = &args.pod_regex {
            builder = builder.pod_regex(pattern.clone());
        }
        if let Some(node) = &args.node {
            builder = builder.node(node.clone());
        }
        if let Some(pattern) = &args.node_regex {
            builder = builder.node_regex(pattern.clone());
        }

        builder.build().context("Invalid label filter")
    }

    /// Build segmenter configuration with flags taking precedence
    pub fn segmenter_config(
        &self,
        namespace: Option<&str>,
        tuning: &TuningArgs,
        raw: bool,
    ) -> Result<SegmenterConfig> {
        let mut config = SegmenterConfig::default();

        if let Some(namespace) = namespace.or(self.namespace.as_deref()) {
            config = config.with_namespace(namespace);
        }
        if let Some(value) = tuning.timestep.as_ref().or(self.timestep.as_ref()) {
            config = config.with_timestep(parse_duration(value).context("Invalid timestep")?);
        }
        if let Some(value) = tuning.min_break.as_ref().or(self.min_break.as_ref()) {
            config = config.with_min_break(parse_duration(value).context("Invalid minimum break")?);
        }
        if let Some(value) = tuning.timeout.as_ref().or(self.query_timeout.as_ref()) {
            config = config.with_query_timeout(parse_duration(value).context("Invalid timeout")?);
        }
        if let Some(count) = tuning.concurrency.or(self.max_concurrent_groups) {
            config = config.with_max_concurrent_groups(count);
        }
        if let Some(metric) = tuning.metric.as_ref().or(self.activity_metric.as_ref()) {
            config.activity_metric = metric.clone();
        }
        if raw {
            config = config.with_display_mode(DisplayMode::Raw);
        }

        Ok(config)
    }
}

/// Parse a duration such as `90s`, `10m`, `1h`, `2d`, or bare seconds
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    let (number, unit) = match value.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };

    let amount: f64 = number
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid duration {:?}", value))?;
    if !amount.is_finite() || amount < 0.0 {
        bail!("invalid duration {:?}", value);
    }

    let multiplier = match unit {
        "ms" => 0.001,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        "d" => 86_400.0,
        "w" => 604_800.0,
        _ => bail!("unknown duration unit {:?} in {:?}", unit, value),
    };

    Duration::try_from_secs_f64(amount * multiplier)
        .map_err(|e| anyhow!("duration {:?} out of range: {}", value, e))
}

/// Parse a point in time: a timestamp, a duration ago, or `now`
pub fn parse_time(value: &str, now: f64) -> Result<f64> {
    if value.trim().eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Ok(timestamp) = parse_timestamp("time", value) {
        return Ok(timestamp);
    }
    let ago = parse_duration(value).with_context(|| format!("Invalid time {:?}", value))?;
    Ok(now - ago.as_secs_f64())
}

/// Resolve the window flags against the current time
pub fn resolve_window(window: &WindowArgs) -> Result<(f64, f64)> {
    let now = Utc::now().timestamp() as f64;
    let start = parse_time(&window.start, now)?;
    let end = parse_time(&window.end, now)?;
    if start >= end {
        bail!("Window start must be before its end");
    }
    Ok((start, end))
}
