//! Activity query template
//!
//! Every query the segmenter issues has the same shape: the increase of a
//! counter over an aggregation window, summed per label group, keeping only
//! positive values.

use crate::filter::LabelFilter;
use crate::models::LabelKey;
use std::time::Duration;

/// Counter used to detect pod activity
pub const DEFAULT_ACTIVITY_METRIC: &str = "container_cpu_usage_seconds_total";

/// Parameterized activity query
#[derive(Debug, Clone)]
pub struct ActivityQuery {
    metric: String,
    filter: LabelFilter,
    group_by: Vec<String>,
    window: Duration,
    group: Option<LabelKey>,
}

impl ActivityQuery {
    pub fn new(filter: LabelFilter, window: Duration) -> Self {
        Self {
            metric: DEFAULT_ACTIVITY_METRIC.to_string(),
            filter,
            group_by: vec!["pod".to_string()],
            window,
            group: None,
        }
    }

    pub fn metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    pub fn group_by<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict the query to a single label group
    pub fn for_group(mut self, group: &LabelKey) -> Self {
        self.group = Some(group.clone());
        self
    }

    /// Render the PromQL expression
    pub fn render(&self) -> String {
        let selector = match &self.group {
            Some(group) => self.filter.selector_for_group(group),
            None => self.filter.selector(),
        };

        let series = if selector.is_empty() {
            self.metric.clone()
        } else {
            format!("{}{{{}}}", self.metric, selector)
        };

        let increase = format!("increase({}[{}])", series, promql_duration(self.window));
        if self.group_by.is_empty() {
            format!("sum({}) > 0", increase)
        } else {
            format!("sum by ({}) ({}) > 0", self.group_by.join(", "), increase)
        }
    }
}

/// Format a duration using the largest whole PromQL unit
pub fn promql_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return format!("{}ms", duration.as_millis());
    }
    if secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
