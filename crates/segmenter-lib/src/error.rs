//! Error types for the run segmenter

use std::time::Duration;
use thiserror::Error;

/// Result type for segmenter operations
pub type SegmenterResult<T> = Result<T, SegmenterError>;

/// Errors raised by the segmentation pipeline and its collaborators
#[derive(Debug, Error)]
pub enum SegmenterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run designation needs at least 2 timestamps, got {count}")]
    InsufficientPoints { count: usize },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Invalid timestamp {value:?} in column {column}")]
    InvalidTimestamp { column: String, value: String },

    #[error("Malformed table: {0}")]
    Table(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SegmenterError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check whether this error was raised before any query was issued
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Failures talking to the time-series service
///
/// Every variant carries the query string that caused it.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query timed out after {timeout:?}: {query}")]
    Timeout { query: String, timeout: Duration },

    #[error("Transport failure for query {query}: {source}")]
    Transport {
        query: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API error for query {query}: {message}")]
    Api { query: String, message: String },

    #[error("Malformed response for query {query}: {reason}")]
    MalformedResponse { query: String, reason: String },
}

impl QueryError {
    /// The query string that failed
    pub fn query(&self) -> &str {
        match self {
            Self::Timeout { query, .. }
            | Self::Transport { query, .. }
            | Self::Api { query, .. }
            | Self::MalformedResponse { query, .. } => query,
        }
    }

    pub fn malformed(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            query: query.into(),
            reason: reason.into(),
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "transport",
            Self::Api { .. } => "api",
            Self::MalformedResponse { .. } => "malformed",
        }
    }
}
