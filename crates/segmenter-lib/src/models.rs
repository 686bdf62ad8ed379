//! Core data models for the run segmenter

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// History columns that never identify a label group
pub const RESERVED_COLUMNS: &[&str] = &["time", "cpu_usage"];

/// Label values identifying one entity (e.g. a pod)
///
/// Backed by an ordered map so keys compare and sort deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelKey(BTreeMap<String, String>);

impl LabelKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a key from label pairs, dropping reserved history columns
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let labels = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| !RESERVED_COLUMNS.contains(&k.as_str()))
            .collect();
        Self(labels)
    }

    /// Add or replace a label
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}=\"{}\"", name, value)?;
        }
        write!(f, "}}")
    }
}

/// One positive activity sample for a label group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPoint {
    pub label_key: LabelKey,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub value: f64,
}

impl ActivityPoint {
    pub fn new(label_key: LabelKey, timestamp: f64, value: f64) -> Self {
        Self {
            label_key,
            timestamp,
            value,
        }
    }
}

/// Padded low-resolution window known to contain activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoarsePeriod {
    pub label_key: LabelKey,
    pub start: f64,
    pub end: f64,
}

impl CoarsePeriod {
    pub fn contains(&self, timestamp: f64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

/// Contiguous period of activity for one label group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub label_key: LabelKey,
    pub start: f64,
    pub end: f64,
}

impl Run {
    pub fn new(label_key: LabelKey, start: f64, end: f64) -> Self {
        Self {
            label_key,
            start,
            end,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Labeled series returned by the time-series service
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    pub labels: LabelKey,
    /// `(timestamp, value)` samples in ascending time order
    pub samples: Vec<(f64, f64)>,
}

/// Time range and resolution for range queries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
    /// Resolution step in seconds
    pub step: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        Self { start, end, step }
    }
}

/// How run boundaries are presented to callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// UTC calendar datetimes
    #[default]
    Calendar,
    /// Seconds since the Unix epoch
    Raw,
}
