//! Container-level analysis: saturation, costing, main container and QoS

use crate::models::{App, AppContainer, QosClass, ResourceInfo};
use crate::stats::magic_round;
use tracing::warn;

/// Relative difference above which computed and collected saturation disagree
const SATURATION_MISMATCH_RATIO: f64 = 0.1;

const CPU_CORE_COST: f64 = 0.0175;
const MEMORY_GIB_COST: f64 = 0.0125;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Saturation of one resource as a ratio of its request (or limit).
///
/// A collected non-zero saturation wins over the computed one. Values are
/// rounded to two decimals unless that would hide a small non-zero value.
pub fn calc_saturation(info: &ResourceInfo, app: &str, container: &str, resource: &str) -> f64 {
    let base = if info.request > 0.0 { info.request } else { info.limit };
    if base <= 0.0 {
        return info.saturation.max(0.0);
    }

    let mut sat = info.usage / base;
    if info.saturation != 0.0 {
        if ((sat - info.saturation) / info.saturation).abs() > SATURATION_MISMATCH_RATIO {
            warn!(
                app = %app,
                container = %container,
                resource = %resource,
                computed = sat,
                collected = info.saturation,
                "Computed and collected saturation differ significantly"
            );
        }
        sat = info.saturation;
    }

    if sat > 0.01 {
        let rounded = (sat * 100.0).round() / 100.0;
        if rounded >= 0.01 {
            sat = rounded;
        }
    }
    sat.max(0.0)
}

/// Value used for costing: usage, then request, then limit
fn costing_value(info: &ResourceInfo) -> f64 {
    if info.usage > 0.0 {
        info.usage
    } else if info.request > 0.0 {
        info.request
    } else {
        info.limit
    }
}

/// Relative cost of running one container
pub fn pseudo_cost(container: &AppContainer) -> f64 {
    let cores = costing_value(&container.cpu.resource);
    let gib = costing_value(&container.memory.resource) / BYTES_PER_GIB;
    magic_round(cores * CPU_CORE_COST + gib * MEMORY_GIB_COST)
}

/// Compute saturation and pseudo-cost for each container, then sort by cost.
pub fn analyze_containers(app: &mut App) {
    let id = app.metadata.to_string();
    for c in app.containers.iter_mut() {
        c.cpu.resource.saturation = calc_saturation(&c.cpu.resource, &id, &c.name, "cpu");
        c.memory.resource.saturation = calc_saturation(&c.memory.resource, &id, &c.name, "memory");
        c.pseudo_cost = pseudo_cost(c);
    }
    app.containers
        .sort_by(|a, b| a.pseudo_cost.total_cmp(&b.pseudo_cost));
}

/// Name of the application's main container, empty when undetermined.
///
/// Expects containers sorted by ascending pseudo-cost.
pub fn identify_main_container(app: &App) -> String {
    match app.containers.as_slice() {
        [] => return String::new(),
        [only] => return only.name.clone(),
        _ => {}
    }

    if app.containers.iter().any(|c| c.name == "main") {
        return "main".to_string();
    }
    if let Some(c) = app.containers.iter().find(|c| c.name == app.metadata.workload) {
        return c.name.clone();
    }

    let n = app.containers.len();
    let (top, runner_up) = (&app.containers[n - 1], &app.containers[n - 2]);
    if top.pseudo_cost > runner_up.pseudo_cost {
        return top.name.clone();
    }

    warn!(app = %app.metadata, containers = n, "Could not identify main container");
    String::new()
}

/// Pod QoS class implied by the containers' resource specifications
pub fn compute_qos(app: &App) -> QosClass {
    let mut guaranteed = true;
    let mut any_spec = false;

    for c in &app.containers {
        for r in [&c.cpu.resource, &c.memory.resource] {
            if r.limit > 0.0 {
                any_spec = true;
                if r.request > 0.0 && r.request != r.limit {
                    guaranteed = false;
                }
            } else {
                guaranteed = false;
                if r.request > 0.0 {
                    any_spec = true;
                }
            }
        }
    }

    if guaranteed && any_spec {
        QosClass::Guaranteed
    } else if any_spec {
        QosClass::Burstable
    } else {
        QosClass::BestEffort
    }
}

/// Every container limits both CPU and memory
pub fn resources_limited(app: &App) -> bool {
    app.containers
        .iter()
        .all(|c| c.cpu.resource.limit > 0.0 && c.memory.resource.limit > 0.0)
}
