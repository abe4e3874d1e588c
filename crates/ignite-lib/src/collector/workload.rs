//! Per-workload collection
//!
//! Runs the full battery of pod and container queries for one workload. Every
//! step is independent: failures become warnings and the remaining steps
//! still run.

use crate::cancel::CancelSignal;
use crate::error::QueryError;
use crate::models::{App, AppContainer, ContainerField, ResourceField, ResourceKind};
use crate::prometheus::templates::{self, QuerySelectors};
use crate::prometheus::{
    aggregate_metric, container_inventory, container_resources, container_value_map,
    ranged_metric, Aggregation, MetricsSource, TimeRange, WithWarnings,
};
use crate::stats::magic_round;
use std::collections::BTreeMap;
use tracing::{error, trace, warn};

const READONLY_VOLUMES_METRIC: &str = "kube_pod_spec_volumes_persistentvolumeclaims_readonly";

/// Collects warnings for one workload, logging each as it arrives
struct Findings<'a> {
    app: &'a str,
    warnings: Vec<String>,
}

impl<'a> Findings<'a> {
    fn new(app: &'a str) -> Self {
        Self {
            app,
            warnings: Vec::new(),
        }
    }

    /// Unwrap a step result, turning failures and backend warnings into findings
    fn take<T>(
        &mut self,
        label: &str,
        result: Result<WithWarnings<T>, QueryError>,
    ) -> Option<T> {
        match result {
            Ok(WithWarnings { value, warnings }) => {
                if !warnings.is_empty() {
                    warn!(
                        app = %self.app,
                        step = %label,
                        warnings = ?warnings,
                        "Warnings while querying metrics"
                    );
                    self.warnings.extend(warnings);
                }
                Some(value)
            }
            Err(e) => {
                let msg = format!(
                    "Error querying metrics for {} on app {}: {}; skipping value",
                    label, self.app, e
                );
                error!(app = %self.app, step = %label, error = %e, "Metrics query failed");
                self.warnings.push(msg);
                None
            }
        }
    }

    fn extend(&mut self, warnings: Vec<String>) {
        self.warnings.extend(warnings);
    }
}

/// Populate settings, containers and metrics of one workload.
///
/// Returns the accumulated warnings; nothing here aborts the workload.
pub async fn collect_app_details(
    source: &dyn MetricsSource,
    app: &mut App,
    range: &TimeRange,
    cancel: &CancelSignal,
) -> Vec<String> {
    let sel = QuerySelectors::new(&app.metadata);
    let id = app.metadata.to_string();
    let mut findings = Findings::new(&id);

    // writeable volumes
    let query = templates::aggregate("min", READONLY_VOLUMES_METRIC, &sel);
    let readonly = aggregate_metric(source, &query, range, Aggregation::Min, cancel).await;
    if let Some(Some(value)) = findings.take("volume access", readonly) {
        if value == 0.0 {
            app.settings.writeable_volume = true;
        }
    }

    // replicas
    let replicas = ranged_metric(source, &templates::replica_count(&sel), range, cancel).await;
    if let Some(Some(value)) = findings.take("replica count", replicas) {
        app.metrics.average_replicas = value;
        app.settings.replicas = value.round().max(0.0) as u32;
    }

    // autoscalers; no series means none targets the deployment
    let query = templates::hpa_replica_bound("min_replicas", &sel);
    let min = ranged_metric(source, &query, range, cancel).await;
    if let Some(Some(value)) = findings.take("HPA min replicas", min) {
        app.settings.hpa_enabled = true;
        app.settings.hpa_min_replicas = value.round().max(0.0) as u32;
    }
    let query = templates::hpa_replica_bound("max_replicas", &sel);
    let max = ranged_metric(source, &query, range, cancel).await;
    if let Some(Some(value)) = findings.take("HPA max replicas", max) {
        app.settings.hpa_enabled = true;
        app.settings.hpa_max_replicas = value.round().max(0.0) as u32;
    }
    let vpa = ranged_metric(source, &templates::vpa_update_mode(&sel), range, cancel).await;
    if let Some(Some(value)) = findings.take("VPA update mode", vpa) {
        app.settings.vpa_enabled = value > 0.0;
    }

    // container inventory; per-container steps need it
    let query = templates::container_info(&sel);
    let inventory = container_inventory(source, &query, range, cancel).await;
    match findings.take("container info", inventory) {
        Some(names) => {
            app.containers = names.into_iter().map(AppContainer::new).collect();
            collect_containers(source, app, &sel, range, cancel, &mut findings).await;
        }
        None => {
            warn!(app = %id, "Container inventory unavailable; skipping container metrics");
        }
    }

    // pod-level network traffic
    let query = templates::network_receive_packets(&sel);
    let rx = ranged_metric(source, &query, range, cancel).await;
    if let Some(Some(rate)) = findings.take("received packets rate", rx) {
        app.metrics.packet_receive_rate = magic_round(rate);
    }
    let query = templates::network_transmit_packets(&sel);
    let tx = ranged_metric(source, &query, range, cancel).await;
    if let Some(Some(rate)) = findings.take("transmitted packets rate", tx) {
        app.metrics.packet_transmit_rate = magic_round(rate);
    }

    // legacy pod-level utilization, superseded by main container saturation
    let cpu = ranged_metric(source, &templates::pod_cpu_utilization(&sel), range, cancel).await;
    if let Some(Some(value)) = findings.take("CPU utilization", cpu) {
        app.metrics.cpu_utilization = value;
    }
    let query = templates::pod_memory_utilization(&sel);
    let memory = ranged_metric(source, &query, range, cancel).await;
    if let Some(Some(value)) = findings.take("memory utilization", memory) {
        app.metrics.memory_utilization = value;
    }

    trace!(app = %id, containers = app.containers.len(), "Collected workload details");
    findings.warnings
}

async fn collect_containers(
    source: &dyn MetricsSource,
    app: &mut App,
    sel: &QuerySelectors,
    range: &TimeRange,
    cancel: &CancelSignal,
    findings: &mut Findings<'_>,
) {
    use ResourceField::*;
    use ResourceKind::*;

    let query = templates::container_restarts(sel);
    let restarts = container_value_map(source, &query, range, cancel).await;
    if let Some(map) = findings.take("restart counts", restarts) {
        findings.extend(distribute(app, ContainerField::RestartCount, &map));
    }

    for (label, query, field) in [
        ("resource requests", templates::container_resource_requests(sel), Request),
        ("resource limits", templates::container_resource_limits(sel), Limit),
    ] {
        let specs = container_resources(source, &query, range, cancel).await;
        if let Some(specs) = findings.take(label, specs) {
            findings.extend(apply_resources(app, field, &specs));
        }
    }

    for (label, query, kind, field) in [
        ("CPU usage", templates::container_cpu_use(sel), Cpu, Usage),
        ("memory usage", templates::container_memory_use(sel), Memory, Usage),
        ("CPU saturation", templates::container_cpu_saturation(sel), Cpu, Saturation),
        ("memory saturation", templates::container_memory_saturation(sel), Memory, Saturation),
        ("CPU throttling", templates::container_cpu_seconds_throttled(sel), Cpu, SecondsThrottled),
        ("CPU shares", templates::container_cpu_shares(sel), Cpu, Shares),
    ] {
        let field = ContainerField::Resource(kind, field);
        let values = container_value_map(source, &query, range, cancel).await;
        if let Some(map) = findings.take(label, values) {
            findings.extend(distribute(app, field, &map));
        }
    }
}

/// Write `<container, resource>` request or limit values onto containers.
///
/// Containers without a value simply have no request or limit set, so only
/// values for containers missing from the inventory are reported.
pub fn apply_resources(
    app: &mut App,
    field: ResourceField,
    specs: &[(String, ResourceKind, f64)],
) -> Vec<String> {
    let mut warnings = Vec::new();
    let id = app.metadata.to_string();

    for (name, kind, value) in specs {
        let target = ContainerField::Resource(*kind, field);
        match app.containers.iter_mut().find(|c| &c.name == name) {
            Some(container) => {
                container.set_field(target, *value);
            }
            None => {
                let msg = format!(
                    "Unexpected container data series for {} (app {}): {}={}; ignoring",
                    target, id, name, value
                );
                warn!("{}", msg);
                warnings.push(msg);
            }
        }
    }

    warnings
}

/// Write a by-container value map onto the workload's containers.
///
/// Values for containers missing from the inventory and inventory
/// containers missing from the map become warnings. Throttling data is
/// routinely absent, so gaps there are not reported.
pub fn distribute(
    app: &mut App,
    field: ContainerField,
    values: &BTreeMap<String, f64>,
) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut unmatched = values.clone();
    let id = app.metadata.to_string();
    let sparse = matches!(field, ContainerField::Resource(_, ResourceField::SecondsThrottled));

    for container in app.containers.iter_mut() {
        match unmatched.remove(&container.name) {
            Some(value) => {
                if !container.set_field(field, value) {
                    let msg = format!(
                        "Cannot set {} on container {} of app {}; ignoring",
                        field, container.name, id
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                }
            }
            None if sparse => {}
            None => {
                let msg = format!(
                    "Missing {} data for container {} of app {}",
                    field, container.name, id
                );
                warn!("{}", msg);
                warnings.push(msg);
            }
        }
    }

    if !unmatched.is_empty() {
        let msg = format!(
            "Unexpected container data series for {} (app {}): {:?}; ignoring",
            field, id, unmatched
        );
        warn!("{}", msg);
        warnings.push(msg);
    }

    warnings
}
