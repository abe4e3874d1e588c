//! Error types for collection and configuration

use std::collections::BTreeMap;
use thiserror::Error;

/// Failure reducing a time series to a single value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("No samples in data series for {label}")]
    NoSamples { label: String },
}

/// Failure of a single telemetry query; never fatal for a workload
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Prometheus API error ({error_type}): {message}")]
    Api { error_type: String, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Query timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Query cancelled")]
    Cancelled,

    #[error("Query {query:?} returned {actual} instead of {expected}")]
    UnexpectedResultType {
        query: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Query {query:?} returned {count} series instead of a single series")]
    SeriesCount { query: String, count: usize },

    #[error("Query {query:?} returned labels {labels:?}, expected {expected:?}")]
    UnexpectedLabels {
        query: String,
        labels: BTreeMap<String, String>,
        expected: Vec<&'static str>,
    },

    #[error(transparent)]
    Stats(#[from] StatsError),
}

/// Invalid invocation parameters; reported before any collection starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid time window: {0}")]
    InvalidTimeWindow(String),

    #[error("Invalid Prometheus URL: {0}")]
    InvalidUrl(String),
}
