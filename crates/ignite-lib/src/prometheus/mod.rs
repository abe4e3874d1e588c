//! Telemetry query layer
//!
//! Talks to a Prometheus-compatible backend through the [`MetricsSource`]
//! trait. Queries are built from fixed templates, executed with a bounded
//! timeout and parsed into typed vectors or matrices.

mod client;
mod query;
pub mod templates;

pub use client::PrometheusClient;
pub use query::{
    aggregate_metric, container_inventory, container_resources, container_value_map,
    ranged_metric, Aggregation, WithWarnings,
};
pub use templates::QuerySelectors;

use crate::cancel::CancelSignal;
use crate::error::{ConfigError, QueryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

/// Timeout applied to every individual query
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Smallest accepted query step
pub const MIN_STEP: Duration = Duration::from_secs(60);

/// Largest accepted query step
pub const MAX_STEP: Duration = Duration::from_secs(24 * 60 * 60);

/// Label set of a series or vector element
pub type Labels = BTreeMap<String, String>;

/// One timestamped value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Unix timestamp in seconds
    pub timestamp: f64,
    pub value: f64,
}

/// Element of an instant vector
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSample {
    pub metric: Labels,
    pub value: Sample,
}

/// Element of a range matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub metric: Labels,
    pub values: Vec<Sample>,
}

/// Typed query result
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Vector(Vec<VectorSample>),
    Matrix(Vec<Series>),
    Scalar(Sample),
    String(String),
}

impl QueryData {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryData::Vector(_) => "vector",
            QueryData::Matrix(_) => "matrix",
            QueryData::Scalar(_) => "scalar",
            QueryData::String(_) => "string",
        }
    }
}

/// Query result plus the warnings the backend attached to it
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub data: QueryData,
    pub warnings: Vec<String>,
}

/// Result of a label enumeration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelValues {
    pub values: Vec<String>,
    pub warnings: Vec<String>,
}

/// Analysis window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl TimeRange {
    /// Validate and build a window.
    ///
    /// Start must be strictly before end, the step between one minute and
    /// one day, and the window must hold at least two steps.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Self, ConfigError> {
        if start >= end {
            return Err(ConfigError::InvalidTimeWindow(format!(
                "start {} must be before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        if step < MIN_STEP || step > MAX_STEP {
            return Err(ConfigError::InvalidTimeWindow(format!(
                "step {}s must be between {}s and {}s",
                step.as_secs(),
                MIN_STEP.as_secs(),
                MAX_STEP.as_secs()
            )));
        }
        let window_secs = (end - start).num_seconds();
        if window_secs / (step.as_secs() as i64) < 2 {
            return Err(ConfigError::InvalidTimeWindow(format!(
                "window of {}s holds fewer than 2 steps of {}s",
                window_secs,
                step.as_secs()
            )));
        }
        Ok(Self { start, end, step })
    }
}

/// Access to a time-series backend
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Human-readable backend identity for logs
    fn describe(&self) -> String {
        "metrics backend".to_string()
    }

    /// Enumerate values of a label seen within the window
    async fn label_values(&self, label: &str, range: &TimeRange) -> Result<LabelValues, QueryError>;

    /// Instant query evaluated at `at`
    async fn query(&self, query: &str, at: DateTime<Utc>) -> Result<QueryResponse, QueryError>;

    /// Range query over the window
    async fn query_range(
        &self,
        query: &str,
        range: &TimeRange,
    ) -> Result<QueryResponse, QueryError>;
}

/// Run a query future under the per-query timeout, aborting on cancellation.
pub async fn bounded<T, F>(cancel: &CancelSignal, fut: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, QueryError>>,
{
    let mut cancel = cancel.clone();
    tokio::select! {
        result = tokio::time::timeout(QUERY_TIMEOUT, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(QueryError::Timeout { secs: QUERY_TIMEOUT.as_secs() }),
        },
        _ = cancel.cancelled() => Err(QueryError::Cancelled),
    }
}
