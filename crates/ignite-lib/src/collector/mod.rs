//! Workload metrics collection
//!
//! This module discovers namespaces and workloads through a [`MetricsSource`]
//! and fills in per-workload settings, containers and metrics. Namespaces are
//! collected concurrently; workloads within a namespace sequentially.
//!
//! [`MetricsSource`]: crate::prometheus::MetricsSource

mod coordinator;
mod progress;
mod workload;


pub use coordinator::{
    collect_all, collect_namespaces, map_namespace, CollectionRequest, WorkloadRef,
    BLOCKED_NAMESPACES,
};
pub use progress::{
    run_with_progress, ProgressCallback, ProgressInfo, ProgressState, PROGRESS_POLL_INTERVAL,
};
pub use workload::{apply_resources, collect_app_details, distribute};
