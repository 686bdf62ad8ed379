//! Label filters for time-series queries
//!
//! A filter constrains each of the node, pod and namespace dimensions with
//! at most one matcher: either an exact value or a regex. Conflicting
//! matchers are rejected when the filter is built, never at query time.

use crate::error::{SegmenterError, SegmenterResult};
use crate::models::LabelKey;
use tracing::warn;

/// How a single label dimension is matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Exact(String),
    Regex(String),
}

impl Matcher {
    fn operator(&self) -> &'static str {
        match self {
            Matcher::Exact(_) => "=",
            Matcher::Regex(_) => "=~",
        }
    }

    fn value(&self) -> &str {
        match self {
            Matcher::Exact(v) | Matcher::Regex(v) => v,
        }
    }
}

/// Validated label filter over the node, pod and namespace dimensions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    node: Option<Matcher>,
    pod: Option<Matcher>,
    namespace: Option<Matcher>,
}

impl LabelFilter {
    pub fn builder() -> LabelFilterBuilder {
        LabelFilterBuilder::default()
    }

    /// Filter constrained to a single namespace
    pub fn namespace(namespace: impl Into<String>) -> SegmenterResult<Self> {
        Self::builder().namespace(namespace).build()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_none() && self.pod.is_none() && self.namespace.is_none()
    }

    fn matchers(&self) -> impl Iterator<Item = (&'static str, &Matcher)> {
        [
            ("node", self.node.as_ref()),
            ("namespace", self.namespace.as_ref()),
            ("pod", self.pod.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, m)| m.map(|m| (name, m)))
    }

    /// Render the selector body, e.g. `namespace="batch",pod=~"job-.*"`
    pub fn selector(&self) -> String {
        self.matchers()
            .map(|(name, m)| format!("{}{}\"{}\"", name, m.operator(), escape_label_value(m.value())))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Render the selector body with extra exact matchers for one label group
    pub fn selector_for_group(&self, group: &LabelKey) -> String {
        let mut parts: Vec<String> = Vec::new();
        let base = self.selector();
        if !base.is_empty() {
            parts.push(base);
        }
        for (name, value) in group.iter() {
            parts.push(format!("{}=\"{}\"", name, escape_label_value(value)));
        }
        parts.join(",")
    }
}

/// Builder for [`LabelFilter`]
#[derive(Debug, Default)]
pub struct LabelFilterBuilder {
    node: Option<String>,
    node_regex: Option<String>,
    pod: Option<String>,
    pod_regex: Option<String>,
    namespace: Option<String>,
    namespace_regex: Option<String>,
}

impl LabelFilterBuilder {
    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn node_regex(mut self, pattern: impl Into<String>) -> Self {
        self.node_regex = Some(pattern.into());
        self
    }

    pub fn pod(mut self, pod: impl Into<String>) -> Self {
        self.pod = Some(pod.into());
        self
    }

    pub fn pod_regex(mut self, pattern: impl Into<String>) -> Self {
        self.pod_regex = Some(pattern.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn namespace_regex(mut self, pattern: impl Into<String>) -> Self {
        self.namespace_regex = Some(pattern.into());
        self
    }

    /// Validate and build the filter
    pub fn build(self) -> SegmenterResult<LabelFilter> {
        let filter = LabelFilter {
            node: resolve("node", self.node, self.node_regex)?,
            pod: resolve("pod", self.pod, self.pod_regex)?,
            namespace: resolve("namespace", self.namespace, self.namespace_regex)?,
        };

        if filter.is_empty() {
            warn!("Label filter constrains no dimension; queries will aggregate across the whole cluster");
        }

        Ok(filter)
    }
}

fn resolve(
    dimension: &str,
    exact: Option<String>,
    pattern: Option<String>,
) -> SegmenterResult<Option<Matcher>> {
    match (exact, pattern) {
        (Some(_), Some(_)) => Err(SegmenterError::config(format!(
            "{} filter cannot set both an exact value and a regex",
            dimension
        ))),
        (Some(value), None) => Ok(Some(Matcher::Exact(value))),
        (None, Some(pattern)) => {
            regex::Regex::new(&pattern).map_err(|e| {
                SegmenterError::config(format!("invalid {} regex {:?}: {}", dimension, pattern, e))
            })?;
            Ok(Some(Matcher::Regex(pattern)))
        }
        (None, None) => Ok(None),
    }
}

/// Escape a label value for a PromQL string literal
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::capture_logs;

    #[test]
    fn test_exact_and_regex_conflict_fails_at_build() {
        let result = LabelFilter::builder()
            .pod("job-1")
            .pod_regex("job-.*")
            .build();

        let err = result.unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("pod"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let result = LabelFilter::builder().namespace_regex("batch-(").build();
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_empty_filter_is_allowed_with_warning() {
        let (result, logs) = capture_logs(|| LabelFilter::builder().build());
        let filter = result.unwrap();

        assert!(filter.is_empty());
        assert_eq!(filter.selector(), "");
        assert!(logs.contains("WARN"));
        assert!(logs.contains("Label filter constrains no dimension"));
    }

    #[test]
    fn test_scoped_filter_does_not_warn() {
        let (result, logs) = capture_logs(|| LabelFilter::builder().namespace("batch").build());

        assert!(result.is_ok());
        assert!(!logs.contains("WARN"));
    }

    #[test]
    fn test_selector_rendering() {
        let filter = LabelFilter::builder()
            .namespace("batch")
            .pod_regex("job-.*")
            .node("worker-1")
            .build()
            .unwrap();

        assert_eq!(
            filter.selector(),
            r#"node="worker-1",namespace="batch",pod=~"job-.*""#
        );
    }

    #[test]
    fn test_selector_for_group_appends_exact_matchers() {
        let filter = LabelFilter::namespace("batch").unwrap();
        let group = LabelKey::new().with("pod", "job-7");

        assert_eq!(
            filter.selector_for_group(&group),
            r#"namespace="batch",pod="job-7""#
        );
    }

    #[test]
    fn test_label_values_are_escaped() {
        let filter = LabelFilter::builder().pod(r#"we"ird"#).build().unwrap();
        assert_eq!(filter.selector(), r#"pod="we\"ird""#);
    }
}
