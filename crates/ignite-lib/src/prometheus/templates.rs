//! PromQL query templates
//!
//! Pods of a deployment are named `<deployment>-<pod_spec_hash>-<pod_id>`,
//! so a workload's pods are selected with the regex `<workload>-.*`.
//!
//! Network statistics are reported per pod (container `POD`), not per
//! container.

use crate::models::AppMetadata;

/// Selector context injected into every template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySelectors {
    pub namespace: String,
    pub workload: String,
    /// `namespace="<ns>",pod=~"<workload>-.*"`
    pub pod_selector: String,
}

impl QuerySelectors {
    pub fn new(metadata: &AppMetadata) -> Self {
        let pod_regex = format!("{}-.*", metadata.workload);
        Self {
            namespace: metadata.namespace.clone(),
            workload: metadata.workload.clone(),
            pod_selector: format!("namespace={:?},pod=~{:?}", metadata.namespace, pod_regex),
        }
    }
}

/// Deployments of a namespace, one sample per deployment
pub fn deployment_labels(namespace: &str) -> String {
    format!("kube_deployment_labels{{namespace={:?}}}", namespace)
}

/// Aggregate of a raw metric across the workload's pods
pub fn aggregate(function: &str, metric: &str, sel: &QuerySelectors) -> String {
    format!("{}({}{{{}}})", function, metric, sel.pod_selector)
}

pub fn replica_count(sel: &QuerySelectors) -> String {
    format!(
        "kube_deployment_status_replicas{{namespace={:?}, deployment={:?}}}",
        sel.namespace, sel.workload
    )
}

/// HPA replica bound (`min_replicas` or `max_replicas`) for HPAs scaling the deployment
pub fn hpa_replica_bound(bound: &str, sel: &QuerySelectors) -> String {
    format!(
        "max(kube_horizontalpodautoscaler_spec_{bound}{{ namespace={ns} }} \
         and on (namespace, horizontalpodautoscaler) kube_horizontalpodautoscaler_info{{ \
         namespace={ns},scaletargetref_kind=\"Deployment\",scaletargetref_name={w} }})",
        bound = bound,
        ns = format!("{:?}", sel.namespace),
        w = format!("{:?}", sel.workload),
    )
}

/// Present only when an active (not `Off`) VPA targets the deployment
pub fn vpa_update_mode(sel: &QuerySelectors) -> String {
    format!(
        "max(kube_verticalpodautoscaler_spec_updatepolicy_updatemode{{ namespace={:?},\
         target_kind=\"Deployment\",target_name={:?},update_mode!=\"Off\" }})",
        sel.namespace, sel.workload
    )
}

pub fn container_restarts(sel: &QuerySelectors) -> String {
    format!(
        "avg by (container) (kube_pod_container_status_restarts_total{{ {} }})",
        sel.pod_selector
    )
}

/// Pod-level CPU utilization in percent of CPU shares
pub fn pod_cpu_utilization(sel: &QuerySelectors) -> String {
    format!(
        "avg(sum by (pod, container) (rate(container_cpu_usage_seconds_total{{ {sel} }}[60s]) * 1024 * 60) \
         / on (pod, container) (container_spec_cpu_shares{{ {sel} }}) / 60 * 100)",
        sel = sel.pod_selector
    )
}

/// Pod-level memory utilization in percent of the memory request
pub fn pod_memory_utilization(sel: &QuerySelectors) -> String {
    format!(
        "avg(sum by (pod, container) (container_memory_working_set_bytes{{ {sel},container!~\"|POD\" }}) \
         / on (pod, container) (kube_pod_container_resource_requests{{ {sel},resource=\"memory\" }}) * 100)",
        sel = sel.pod_selector
    )
}

pub fn container_info(sel: &QuerySelectors) -> String {
    format!(
        "sum by (container) (kube_pod_container_info{{ {} }})",
        sel.pod_selector
    )
}

pub fn container_resource_requests(sel: &QuerySelectors) -> String {
    format!(
        "avg by (container, resource) (kube_pod_container_resource_requests{{ {} }})",
        sel.pod_selector
    )
}

pub fn container_resource_limits(sel: &QuerySelectors) -> String {
    format!(
        "avg by (container, resource) (kube_pod_container_resource_limits{{ {} }})",
        sel.pod_selector
    )
}

pub fn container_cpu_use(sel: &QuerySelectors) -> String {
    format!(
        "avg by (container) (rate(container_cpu_usage_seconds_total{{ {} }}[5m]))",
        sel.pod_selector
    )
}

pub fn container_memory_use(sel: &QuerySelectors) -> String {
    format!(
        "avg by (container) (container_memory_working_set_bytes{{ {} }})",
        sel.pod_selector
    )
}

pub fn container_cpu_saturation(sel: &QuerySelectors) -> String {
    format!(
        "avg (rate(container_cpu_usage_seconds_total{{ {sel},container!~\"|POD\" }}[5m]) / on(pod, container) \
         kube_pod_container_resource_requests{{ {sel},resource=\"cpu\" }}) by (container)",
        sel = sel.pod_selector
    )
}

pub fn container_memory_saturation(sel: &QuerySelectors) -> String {
    format!(
        "avg (container_memory_working_set_bytes{{ {sel},container!~\"|POD\" }} / on(pod, container) \
         kube_pod_container_resource_requests{{ {sel},resource=\"memory\" }}) by (container)",
        sel = sel.pod_selector
    )
}

pub fn container_cpu_shares(sel: &QuerySelectors) -> String {
    format!(
        "avg by (container) (container_spec_cpu_shares{{ {} }})",
        sel.pod_selector
    )
}

pub fn container_cpu_seconds_throttled(sel: &QuerySelectors) -> String {
    format!(
        "avg by (container) (rate(container_cpu_cfs_throttled_seconds_total{{ {} }}[5m]))",
        sel.pod_selector
    )
}

pub fn network_receive_packets(sel: &QuerySelectors) -> String {
    format!(
        "avg (rate(container_network_receive_packets_total{{ {} }}[5m]))",
        sel.pod_selector
    )
}

pub fn network_transmit_packets(sel: &QuerySelectors) -> String {
    format!(
        "avg (rate(container_network_transmit_packets_total{{ {} }}[5m]))",
        sel.pod_selector
    )
}
