//! Observability infrastructure for the collection engine
//!
//! Provides:
//! - Prometheus self-metrics (query latency, query errors, workloads collected)
//! - Structured event logging with tracing

use prometheus::{
    register_histogram, register_int_counter, Encoder, Histogram, IntCounter, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for backend query latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CollectorMetricsInner> = OnceLock::new();

struct CollectorMetricsInner {
    query_latency_seconds: Histogram,
    queries: IntCounter,
    query_errors: IntCounter,
    workloads_collected: IntCounter,
    namespaces_collected: IntCounter,
}

impl CollectorMetricsInner {
    fn new() -> Self {
        Self {
            query_latency_seconds: register_histogram!(
                "kube_ignite_query_latency_seconds",
                "Time spent waiting for metrics backend queries",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register query_latency_seconds"),

            queries: register_int_counter!(
                "kube_ignite_queries_total",
                "Total number of metrics backend queries issued"
            )
            .expect("Failed to register queries"),

            query_errors: register_int_counter!(
                "kube_ignite_query_errors_total",
                "Total number of failed metrics backend queries"
            )
            .expect("Failed to register query_errors"),

            workloads_collected: register_int_counter!(
                "kube_ignite_workloads_collected_total",
                "Total number of workloads whose details were collected"
            )
            .expect("Failed to register workloads_collected"),

            namespaces_collected: register_int_counter!(
                "kube_ignite_namespaces_collected_total",
                "Total number of namespaces fully collected"
            )
            .expect("Failed to register namespaces_collected"),
        }
    }
}

/// Collection metrics handle
///
/// Clones share the same process-wide instruments.
#[derive(Clone)]
pub struct CollectorMetrics {
    inner: &'static CollectorMetricsInner,
}

impl Default for CollectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorMetrics {
    /// Get a handle, registering the instruments on first use
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new),
        }
    }

    /// Record one finished query
    pub fn observe_query(&self, duration_secs: f64, success: bool) {
        self.inner.query_latency_seconds.observe(duration_secs);
        self.inner.queries.inc();
        if !success {
            self.inner.query_errors.inc();
        }
    }

    pub fn inc_workloads_collected(&self) {
        self.inner.workloads_collected.inc();
    }

    pub fn inc_namespaces_collected(&self) {
        self.inner.namespaces_collected.inc();
    }

    pub fn queries(&self) -> u64 {
        self.inner.queries.get()
    }

    pub fn query_errors(&self) -> u64 {
        self.inner.query_errors.get()
    }

    /// Render all registered metrics in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Structured logger for collection and analysis events
#[derive(Clone)]
pub struct StructuredLogger {
    backend: String,
}

impl StructuredLogger {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
        }
    }

    /// Log the start of a collection run
    pub fn log_collection_started(&self, namespace: Option<&str>, start: &str, end: &str) {
        info!(
            event = "collection_started",
            backend = %self.backend,
            namespace = namespace.unwrap_or("*"),
            start = %start,
            end = %end,
            "Collecting workload metrics"
        );
    }

    /// Log a namespace whose workloads were all collected
    pub fn log_namespace_collected(&self, namespace: &str, apps: usize) {
        info!(
            event = "namespace_collected",
            backend = %self.backend,
            namespace = %namespace,
            apps = apps,
            "Namespace collected"
        );
    }

    /// Log the outcome of analyzing one application
    pub fn log_app_analyzed(&self, app: &str, rating: i32, confidence: i32, conclusion: &str) {
        info!(
            event = "app_analyzed",
            app = %app,
            rating = rating,
            confidence = confidence,
            conclusion = %conclusion,
            "Application analyzed"
        );
    }

    /// Log the end of a collection run
    pub fn log_collection_finished(&self, apps: usize, failed_namespaces: usize, cancelled: bool) {
        if failed_namespaces > 0 || cancelled {
            warn!(
                event = "collection_finished",
                backend = %self.backend,
                apps = apps,
                failed_namespaces = failed_namespaces,
                cancelled = cancelled,
                "Collection finished with errors"
            );
        } else {
            info!(
                event = "collection_finished",
                backend = %self.backend,
                apps = apps,
                "Collection finished"
            );
        }
    }
}
