//! Run segmentation library for pod CPU activity
//!
//! This crate provides the core functionality for:
//! - Querying activity history from a Prometheus-compatible service
//! - Finding coarse activity windows per label group
//! - Designating discrete runs from fine-grained activity
//! - Persisting run tables as CSV
//! - Metrics and structured logging for segmentation passes

pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod observability;
pub mod query;
pub mod segment;
pub mod table;

#[cfg(test)]
mod test_support;

pub use config::SegmenterConfig;
pub use error::{QueryError, SegmenterError, SegmenterResult};
pub use filter::{LabelFilter, LabelFilterBuilder, Matcher};
pub use models::*;
pub use observability::{SegmenterMetrics, StructuredLogger};
pub use query::{PrometheusClient, TimeSeriesService};
pub use segment::{RunSegmenter, RunParams};
pub use table::{RunRecord, RunTable};
