//! Typed query helpers
//!
//! Each helper issues one query, validates the result shape and label set,
//! and returns the parsed value together with any non-fatal warnings.

use super::{
    bounded, Labels, MetricsSource, QueryData, QueryResponse, Series, TimeRange, VectorSample,
};
use crate::cancel::CancelSignal;
use crate::error::QueryError;
use crate::models::ResourceKind;
use crate::observability::CollectorMetrics;
use crate::stats::{self, representative_value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// A parsed value plus advisory warnings
#[derive(Debug, Clone, PartialEq)]
pub struct WithWarnings<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> WithWarnings<T> {
    fn new(value: T, warnings: Vec<String>) -> Self {
        Self { value, warnings }
    }
}

/// Aggregation applied across the samples of a single series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Min,
    Sum,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Min => "min",
            Aggregation::Sum => "sum",
        }
    }

    fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Aggregation::Min => stats::min(values),
            Aggregation::Sum => stats::sum(values),
        }
    }
}

async fn run_range(
    source: &dyn MetricsSource,
    query: &str,
    range: &TimeRange,
    cancel: &CancelSignal,
) -> Result<QueryResponse, QueryError> {
    let metrics = CollectorMetrics::new();
    let started = Instant::now();
    let result = bounded(cancel, source.query_range(query, range)).await;
    metrics.observe_query(started.elapsed().as_secs_f64(), result.is_ok());
    trace!(query = %query, ok = result.is_ok(), "Range query complete");
    result
}

async fn run_instant(
    source: &dyn MetricsSource,
    query: &str,
    range: &TimeRange,
    cancel: &CancelSignal,
) -> Result<QueryResponse, QueryError> {
    let metrics = CollectorMetrics::new();
    let started = Instant::now();
    let result = bounded(cancel, source.query(query, range.end)).await;
    metrics.observe_query(started.elapsed().as_secs_f64(), result.is_ok());
    trace!(query = %query, ok = result.is_ok(), "Instant query complete");
    result
}

fn expect_matrix(
    query: &str,
    response: QueryResponse,
) -> Result<(Vec<Series>, Vec<String>), QueryError> {
    match response.data {
        QueryData::Matrix(series) => Ok((series, response.warnings)),
        other => Err(QueryError::UnexpectedResultType {
            query: query.to_string(),
            expected: "matrix",
            actual: other.kind(),
        }),
    }
}

fn expect_vector(
    query: &str,
    response: QueryResponse,
) -> Result<(Vec<VectorSample>, Vec<String>), QueryError> {
    match response.data {
        QueryData::Vector(samples) => Ok((samples, response.warnings)),
        other => Err(QueryError::UnexpectedResultType {
            query: query.to_string(),
            expected: "vector",
            actual: other.kind(),
        }),
    }
}

/// Pick the single series of a matrix; `None` when there is no data
fn single_series(query: &str, mut series: Vec<Series>) -> Result<Option<Series>, QueryError> {
    match series.len() {
        0 => Ok(None),
        1 => Ok(series.pop()),
        count => Err(QueryError::SeriesCount {
            query: query.to_string(),
            count,
        }),
    }
}

fn has_exact_labels(labels: &Labels, expected: &[&str]) -> bool {
    labels.len() == expected.len() && expected.iter().all(|k| labels.contains_key(*k))
}

/// Aggregate a raw metric across the workload's pods and over time.
///
/// The backend must return a single label-free series.
pub async fn aggregate_metric(
    source: &dyn MetricsSource,
    query: &str,
    range: &TimeRange,
    aggregation: Aggregation,
    cancel: &CancelSignal,
) -> Result<WithWarnings<Option<f64>>, QueryError> {
    let response = run_range(source, query, range, cancel).await?;
    let (series, warnings) = expect_matrix(query, response)?;
    let Some(series) = single_series(query, series)? else {
        return Ok(WithWarnings::new(None, warnings));
    };
    if !series.metric.is_empty() {
        return Err(QueryError::UnexpectedLabels {
            query: query.to_string(),
            labels: series.metric,
            expected: vec![],
        });
    }

    let values: Vec<f64> = series.values.iter().map(|s| s.value).collect();
    Ok(WithWarnings::new(Some(aggregation.apply(&values)), warnings))
}

/// Reduce the single series returned by a range query to one value.
///
/// No series means no data. Labels on the series are tolerated.
pub async fn ranged_metric(
    source: &dyn MetricsSource,
    query: &str,
    range: &TimeRange,
    cancel: &CancelSignal,
) -> Result<WithWarnings<Option<f64>>, QueryError> {
    let response = run_range(source, query, range, cancel).await?;
    let (series, mut warnings) = expect_matrix(query, response)?;
    let Some(series) = single_series(query, series)? else {
        return Ok(WithWarnings::new(None, warnings));
    };

    let reduced = representative_value(&series.values, query)?;
    warnings.extend(reduced.warnings);
    Ok(WithWarnings::new(Some(reduced.value), warnings))
}

/// Reduce a by-container range query to a map of container name to value.
///
/// Label-free aggregate series and the `""`/`POD` pseudo containers are
/// skipped; series that cannot be reduced turn into warnings.
pub async fn container_value_map(
    source: &dyn MetricsSource,
    query: &str,
    range: &TimeRange,
    cancel: &CancelSignal,
) -> Result<WithWarnings<BTreeMap<String, f64>>, QueryError> {
    let response = run_range(source, query, range, cancel).await?;
    let (series, mut warnings) = expect_matrix(query, response)?;

    let mut values = BTreeMap::new();
    for s in series {
        if s.metric.is_empty() {
            continue;
        }
        if s.metric.len() > 1 {
            let msg = format!(
                "Series for query {:?} carries labels {:?}, expected [\"container\"]; ignoring extras",
                query, s.metric
            );
            warn!("{}", msg);
            warnings.push(msg);
        }
        let Some(name) = s.metric.get("container") else {
            let msg = format!(
                "Series for query {:?} lacks the required \"container\" label ({:?}); skipping series",
                query, s.metric
            );
            warn!("{}", msg);
            warnings.push(msg);
            continue;
        };
        if name.is_empty() || name == "POD" {
            continue;
        }

        let label = format!("container {:?}, query {:?}", name, query);
        match representative_value(&s.values, &label) {
            Ok(reduced) => {
                warnings.extend(reduced.warnings);
                values.insert(name.clone(), reduced.value);
            }
            Err(e) => {
                let msg = format!(
                    "Failed statistical processing for {}: {}; skipping series",
                    label, e
                );
                warn!("{}", msg);
                warnings.push(msg);
            }
        }
    }

    Ok(WithWarnings::new(values, warnings))
}

/// Container inventory: one name per sample, each carrying only `container`
pub async fn container_inventory(
    source: &dyn MetricsSource,
    query: &str,
    range: &TimeRange,
    cancel: &CancelSignal,
) -> Result<WithWarnings<Vec<String>>, QueryError> {
    let response = run_instant(source, query, range, cancel).await?;
    let (samples, warnings) = expect_vector(query, response)?;

    let mut names = Vec::with_capacity(samples.len());
    for sample in samples {
        if !has_exact_labels(&sample.metric, &["container"]) {
            return Err(QueryError::UnexpectedLabels {
                query: query.to_string(),
                labels: sample.metric,
                expected: vec!["container"],
            });
        }
        if let Some(name) = sample.metric.get("container") {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }

    Ok(WithWarnings::new(names, warnings))
}

/// Resource requests or limits keyed by `<container, resource>`
pub async fn container_resources(
    source: &dyn MetricsSource,
    query: &str,
    range: &TimeRange,
    cancel: &CancelSignal,
) -> Result<WithWarnings<Vec<(String, ResourceKind, f64)>>, QueryError> {
    let response = run_instant(source, query, range, cancel).await?;
    let (samples, mut warnings) = expect_vector(query, response)?;

    let mut values = Vec::with_capacity(samples.len());
    for sample in samples {
        if !has_exact_labels(&sample.metric, &["container", "resource"]) {
            return Err(QueryError::UnexpectedLabels {
                query: query.to_string(),
                labels: sample.metric,
                expected: vec!["container", "resource"],
            });
        }
        let name = sample.metric["container"].clone();
        let resource = &sample.metric["resource"];
        match ResourceKind::from_label(resource) {
            Some(kind) => values.push((name, kind, sample.value.value)),
            None => {
                debug!(query = %query, resource = %resource, "Ignoring unrecognized resource type");
                warnings.push(format!(
                    "Query {:?} returned unrecognized resource type {:?}; ignoring",
                    query, resource
                ));
            }
        }
    }

    Ok(WithWarnings::new(values, warnings))
}
