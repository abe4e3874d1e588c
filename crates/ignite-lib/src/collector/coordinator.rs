//! Fan-out collection coordinator
//!
//! One task per namespace, each collecting its workloads sequentially and
//! sending the finished records to a single collector task.

use super::progress::{ProgressCallback, ProgressInfo};
use super::workload::collect_app_details;
use crate::cancel::CancelSignal;
use crate::error::QueryError;
use crate::models::{App, AppMetadata};
use crate::observability::{CollectorMetrics, StructuredLogger};
use crate::prometheus::templates;
use crate::prometheus::{bounded, MetricsSource, QueryData, TimeRange};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Namespaces never analyzed
pub const BLOCKED_NAMESPACES: &[&str] = &["kube-system", "kube-public", "kube-node-lease"];

/// A single workload to collect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub name: String,
    pub kind: String,
    pub api_version: String,
}

impl WorkloadRef {
    pub fn deployment(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "Deployment".to_string(),
            api_version: "apps/v1".to_string(),
        }
    }
}

/// What to collect and over which window
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    /// Restrict to one namespace; all non-system namespaces when `None`
    pub namespace: Option<String>,
    /// Restrict to one workload; requires `namespace`
    pub workload: Option<WorkloadRef>,
    pub range: TimeRange,
}

impl CollectionRequest {
    pub fn all(range: TimeRange) -> Self {
        Self {
            namespace: None,
            workload: None,
            range,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn workload(mut self, workload: WorkloadRef) -> Self {
        self.workload = Some(workload);
        self
    }
}

/// Enumerate namespaces seen during the window, minus the system ones.
pub async fn collect_namespaces(
    source: &dyn MetricsSource,
    range: &TimeRange,
    cancel: &CancelSignal,
) -> Result<Vec<String>, QueryError> {
    let labels = bounded(cancel, source.label_values("namespace", range)).await?;
    if !labels.warnings.is_empty() {
        warn!(warnings = ?labels.warnings, "Warnings while listing namespaces");
    }

    let namespaces: Vec<String> = labels
        .values
        .into_iter()
        .filter(|ns| !BLOCKED_NAMESPACES.contains(&ns.as_str()))
        .collect();
    debug!(count = namespaces.len(), "Discovered namespaces");
    Ok(namespaces)
}

async fn discover_workloads(
    source: &dyn MetricsSource,
    namespace: &str,
    range: &TimeRange,
    cancel: &CancelSignal,
) -> Result<Vec<App>, QueryError> {
    let query = templates::deployment_labels(namespace);
    let response = bounded(cancel, source.query(&query, range.end)).await?;
    if !response.warnings.is_empty() {
        warn!(
            namespace = %namespace,
            warnings = ?response.warnings,
            "Warnings while listing deployments"
        );
    }

    let samples = match response.data {
        QueryData::Vector(samples) => samples,
        other => {
            return Err(QueryError::UnexpectedResultType {
                query,
                expected: "vector",
                actual: other.kind(),
            })
        }
    };

    let mut apps = Vec::with_capacity(samples.len());
    for sample in samples {
        match sample.metric.get("deployment") {
            Some(name) => apps.push(App::new(AppMetadata::deployment(namespace, name.clone()))),
            None => warn!(
                namespace = %namespace,
                labels = ?sample.metric,
                "Deployment sample without deployment label"
            ),
        }
    }
    Ok(apps)
}

/// Discover and collect every workload of one namespace.
///
/// Discovery failures are logged and yield an empty list; the namespace
/// still counts as done.
pub async fn map_namespace(
    source: &dyn MetricsSource,
    namespace: &str,
    range: &TimeRange,
    progress: &ProgressCallback,
    cancel: &CancelSignal,
) -> Vec<App> {
    let metrics = CollectorMetrics::new();
    let mut apps = match discover_workloads(source, namespace, range, cancel).await {
        Ok(apps) => apps,
        Err(e) => {
            error!(namespace = %namespace, error = %e, "Failed to discover workloads");
            Vec::new()
        }
    };

    progress(ProgressInfo::workloads_total(apps.len()), true);
    for app in apps.iter_mut() {
        let warnings = collect_app_details(source, app, range, cancel).await;
        if !warnings.is_empty() {
            debug!(
                namespace = %namespace,
                workload = %app.metadata.workload,
                warnings = warnings.len(),
                "Workload collected with warnings"
            );
        }
        metrics.inc_workloads_collected();
        progress(ProgressInfo::workloads_done(1), true);
    }

    metrics.inc_namespaces_collected();
    progress(ProgressInfo::namespaces_done(1), true);
    apps
}

/// Collect every workload selected by `request`.
///
/// Namespace enumeration failure is fatal; everything after that degrades to
/// warnings and partially populated records.
pub async fn collect_all(
    source: Arc<dyn MetricsSource>,
    request: CollectionRequest,
    progress: ProgressCallback,
    cancel: CancelSignal,
) -> Result<Vec<App>, QueryError> {
    let range = request.range;
    let logger = StructuredLogger::new(source.describe());
    logger.log_collection_started(
        request.namespace.as_deref(),
        &range.start.to_rfc3339(),
        &range.end.to_rfc3339(),
    );

    if request.namespace.is_none() {
        if let Some(workload) = &request.workload {
            warn!(
                workload = %workload.name,
                "Workload filter requires a namespace; collecting all workloads"
            );
        }
    }

    let namespaces = match &request.namespace {
        Some(ns) => vec![ns.clone()],
        None => collect_namespaces(source.as_ref(), &range, &cancel).await?,
    };
    progress(ProgressInfo::namespaces_total(namespaces.len()), false);

    if let (Some(ns), Some(workload)) = (&request.namespace, &request.workload) {
        progress(ProgressInfo::workloads_total(1), true);
        let mut app = App::new(AppMetadata {
            namespace: ns.clone(),
            workload: workload.name.clone(),
            workload_kind: workload.kind.clone(),
            workload_api_version: workload.api_version.clone(),
        });
        collect_app_details(source.as_ref(), &mut app, &range, &cancel).await;
        CollectorMetrics::new().inc_workloads_collected();
        progress(
            ProgressInfo {
                namespaces_done: 1,
                workloads_done: 1,
                ..Default::default()
            },
            true,
        );
        logger.log_collection_finished(1, 0, cancel.is_cancelled());
        return Ok(vec![app]);
    }

    let (tx, mut rx) = mpsc::channel::<Vec<App>>(namespaces.len().max(1));
    let gather = tokio::spawn(async move {
        let mut all = Vec::new();
        while let Some(apps) = rx.recv().await {
            all.extend(apps);
        }
        all
    });

    let mut workers = JoinSet::new();
    for namespace in namespaces {
        let source = Arc::clone(&source);
        let progress = Arc::clone(&progress);
        let cancel = cancel.clone();
        let tx = tx.clone();
        let logger = logger.clone();
        workers.spawn(async move {
            let apps = map_namespace(source.as_ref(), &namespace, &range, &progress, &cancel).await;
            logger.log_namespace_collected(&namespace, apps.len());
            if tx.send(apps).await.is_err() {
                error!(namespace = %namespace, "Result collector closed before namespace finished");
            }
        });
    }
    drop(tx);

    let mut failed = 0;
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Namespace worker failed");
            failed += 1;
        }
    }

    let apps = match gather.await {
        Ok(apps) => apps,
        Err(e) => {
            error!(error = %e, "Result collector failed");
            Vec::new()
        }
    };
    logger.log_collection_finished(apps.len(), failed, cancel.is_cancelled());
    Ok(apps)
}
