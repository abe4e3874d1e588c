//! Rating, confidence, risk and conclusion scoring

use super::containers::resources_limited;
use crate::models::{App, AppAnalysis, AppContainer, AppFlag, Conclusion, QosClass, RiskLevel};
use std::cmp::Ordering;

const CPU_WEIGHT: f64 = 0.6;
const MEMORY_WEIGHT: f64 = 0.4;

/// Rating bump by utilization floor, highest floor first
const UTILIZATION_RATINGS: &[(f64, i32)] = &[
    (100.0, 60), // bursting: room to improve performance
    (80.0, 20),  // little room to optimize
    (40.0, 40),
    (1.0, 60), // lots of room to optimize
];

/// Rating bump for one resource's utilization percent
pub fn utilization_rating(utilization: f64) -> i32 {
    UTILIZATION_RATINGS
        .iter()
        .find(|(floor, _)| utilization >= *floor)
        .map(|(_, bump)| *bump)
        .unwrap_or(0)
}

/// Combined bump; zero when either resource shows no utilization
pub fn utilization_combined_rating(cpu: f64, memory: f64) -> i32 {
    let (cpu_bump, mem_bump) = (utilization_rating(cpu), utilization_rating(memory));
    if cpu_bump == 0 || mem_bump == 0 {
        return 0;
    }
    (cpu_bump + mem_bump) / 2
}

/// Human-readable estimate of the efficiency gain, if one can be made
pub fn efficiency_improvement_estimate(cpu: f64, memory: f64) -> Option<String> {
    if cpu <= 0.0 || memory <= 0.0 || cpu >= 80.0 || memory >= 80.0 {
        return None;
    }
    let imp = ((160.0 - cpu - memory) / 2.0 / 10.0).round() * 10.0;
    let estimate = if imp >= 60.0 {
        format!("2x-{}x", 1.0 + (100.0 / imp * 10.0).round() / 10.0)
    } else if imp > 20.0 {
        format!("{:.0}-{:.0}%", imp - 20.0, imp)
    } else {
        format!("up to {:.0}%", imp)
    };
    Some(estimate)
}

/// Weighted efficiency in 0..=100; `None` without memory utilization data
pub fn efficiency_rate(cpu: f64, memory: f64) -> Option<i32> {
    if memory == 0.0 {
        None
    } else if cpu == 0.0 {
        Some(0)
    } else {
        Some((cpu.min(100.0) * CPU_WEIGHT + memory.min(100.0) * MEMORY_WEIGHT).round() as i32)
    }
}

/// Reliability risk and the cautions explaining it
pub fn risk_assessment(app: &App) -> (RiskLevel, Vec<String>) {
    let mut risk = RiskLevel::None;
    let mut cautions = Vec::new();

    match app.settings.qos_class {
        Some(QosClass::BestEffort) => {
            risk = risk.max(RiskLevel::High);
            cautions.push("Pod QoS class is Best Effort".to_string());
        }
        Some(QosClass::Guaranteed) => {}
        other => {
            risk = risk.max(RiskLevel::Medium);
            let title = other.map(|q| q.title()).unwrap_or("Unknown");
            cautions.push(format!("Pod QoS class is {}", title));
        }
    }

    let m = &app.metrics;
    let peak = m.cpu_utilization.max(m.memory_utilization);
    if peak >= 200.0 || m.cpu_seconds_throttled >= 0.7 {
        risk = risk.max(RiskLevel::High);
        cautions.push("Resource utilization significantly exceeds allocation".to_string());
    } else if peak > 120.0 || m.cpu_seconds_throttled >= 0.25 {
        risk = risk.max(RiskLevel::High);
        cautions.push("Resource utilization exceeds allocation".to_string());
    } else if peak > 90.0 || m.cpu_seconds_throttled > 0.1 {
        risk = risk.max(RiskLevel::Medium);
        cautions.push("Resource utilization close to allocation".to_string());
    }

    (risk.max(RiskLevel::Low), cautions)
}

/// Blocker message when the main container lacks resource specifications
fn missing_resource_spec(main: Option<&AppContainer>) -> Option<&'static str> {
    let Some(main) = main else {
        return Some("Resources not specified: main container not identified");
    };
    let cpu = main.cpu.resource.request > 0.0 || main.cpu.resource.limit > 0.0;
    let memory = main.memory.resource.request > 0.0 || main.memory.resource.limit > 0.0;
    match (cpu, memory) {
        (true, true) => None,
        (false, false) => Some("Resources not specified (request or limit for cpu and memory is required)"),
        (false, true) => Some("CPU resources not specified (request or limit is required)"),
        (true, false) => Some("Memory resources not specified (request or limit is required)"),
    }
}

/// Score an app whose containers, settings and metrics are finalized.
///
/// Starts from a fresh analysis; only the main container carries over.
pub fn score(app: &App) -> AppAnalysis {
    let mut o = AppAnalysis {
        main_container: app.analysis.main_container.clone(),
        ..Default::default()
    };
    let m = &app.metrics;

    let main = app
        .container_index_by_name(&o.main_container)
        .filter(|_| !o.main_container.is_empty())
        .map(|i| &app.containers[i]);
    if main.is_some() {
        o.flags.insert(AppFlag::MainContainer, true);
    } else {
        o.blockers.push("Could not identify main container".to_string());
        o.flags.insert(AppFlag::MainContainer, false);
    }
    if !app.containers.is_empty() {
        o.flags.insert(AppFlag::MultiContainer, app.containers.len() > 1);
    }

    o.flags.insert(AppFlag::WriteableVolume, app.settings.writeable_volume);
    if app.settings.writeable_volume {
        o.blockers.push("Stateful: pods have writeable volumes".to_string());
    }

    o.flags.insert(
        AppFlag::ResourceGuaranteed,
        app.settings.qos_class == Some(QosClass::Guaranteed),
    );
    o.flags.insert(AppFlag::ResourceLimits, resources_limited(app));
    match missing_resource_spec(main) {
        None => {
            o.flags.insert(AppFlag::ResourceSpec, true);
        }
        Some(msg) => {
            o.flags.insert(AppFlag::ResourceSpec, false);
            o.blockers.push(msg.to_string());
            o.recommendations.push("Define resource levels to improve reliability".to_string());
        }
    }

    // utilization
    let (cpu, mem) = (m.cpu_utilization, m.memory_utilization);
    o.flags.insert(AppFlag::Utilization, cpu > 0.0 && mem > 0.0);
    let bump = utilization_combined_rating(cpu, mem);
    if bump != 0 {
        o.rating += bump;
        o.confidence += 30;
        if cpu >= 100.0 || mem >= 100.0 {
            o.opportunities.push("Improve performance/reliability".to_string());
            o.flags.insert(AppFlag::Burst, true);
        } else {
            if bump >= 30 {
                let by = efficiency_improvement_estimate(cpu, mem)
                    .map(|e| format!(" by {}", e))
                    .unwrap_or_default();
                o.opportunities.push(format!("Improve efficiency{}", by));
            }
            o.flags.insert(AppFlag::Burst, false);
        }
    } else {
        o.cautions.push("Idle application".to_string());
        o.flags.insert(AppFlag::Burst, false);
    }
    o.efficiency_rate = efficiency_rate(cpu, mem);

    // traffic
    if m.request_rate == 0.0 {
        o.blockers.push("No requests are being processed".to_string());
        o.flags.insert(AppFlag::Traffic, false);
    } else if m.request_rate < 2.0 {
        o.cautions.push("Low request rate".to_string());
        o.rating -= 10;
    } else {
        o.flags.insert(AppFlag::Traffic, true);
        if m.request_rate > 100.0 {
            o.rating += 10;
        }
    }

    // replicas
    let replicas = m.average_replicas;
    let (single, many) = if replicas <= 1.0 {
        o.rating -= 20;
        o.confidence += 10;
        o.cautions.push("Less than 2 replicas".to_string());
        (true, false)
    } else if replicas >= 7.0 {
        o.rating += 20;
        o.confidence += 30;
        (false, true)
    } else {
        if replicas > 3.0 {
            o.rating += 10;
            o.confidence += 10;
        }
        (false, false)
    };
    o.flags.insert(AppFlag::SingleReplica, single);
    o.flags.insert(AppFlag::ManyReplicas, many);

    let (risk, cautions) = risk_assessment(app);
    o.reliability_risk = Some(risk);
    o.cautions.extend(cautions);

    if !o.blockers.is_empty() {
        o.rating = -100;
        o.confidence = 100;
    }
    o.rating = o.rating.clamp(-100, 100);
    o.confidence = o.confidence.clamp(0, 100);

    o.conclusion = conclusion(o.reliability_risk, o.efficiency_rate);

    if !app.settings.writeable_volume {
        let mut goals = Vec::new();
        if o.efficiency_rate.map_or(false, |r| r < 80) {
            goals.push("efficiency");
        }
        if o.reliability_risk.map_or(true, |r| r > RiskLevel::Low) {
            goals.push("reliability");
        }
        if !goals.is_empty() {
            o.recommendations.push(format!("Optimize to improve {}", goals.join(" and ")));
        }
    }

    o
}

/// Overall conclusion from risk and efficiency
pub fn conclusion(risk: Option<RiskLevel>, efficiency: Option<i32>) -> Conclusion {
    match (risk, efficiency) {
        (Some(r), _) if r >= RiskLevel::High => Conclusion::ReliabilityRisk,
        (_, Some(e)) if e < 60 => Conclusion::ExcessiveCost,
        (Some(r), _) if r <= RiskLevel::Low => Conclusion::Ok,
        _ => Conclusion::InsufficientData,
    }
}

/// Presentation order: best opportunities first.
///
/// Rating descending; for equal ratings, confidence descending among
/// candidates and ascending among blocked apps; then namespace and name.
pub fn opportunity_order(a: &App, b: &App) -> Ordering {
    let (x, y) = (&a.analysis, &b.analysis);
    y.rating
        .cmp(&x.rating)
        .then_with(|| {
            if x.rating >= 0 {
                y.confidence.cmp(&x.confidence)
            } else {
                x.confidence.cmp(&y.confidence)
            }
        })
        .then_with(|| a.metadata.namespace.cmp(&b.metadata.namespace))
        .then_with(|| a.metadata.workload.cmp(&b.metadata.workload))
}

/// Apps worth presenting as optimization candidates
pub fn is_qualified(app: &App) -> bool {
    app.analysis.rating >= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization_rating_table() {
        assert_eq!(utilization_rating(150.0), 60);
        assert_eq!(utilization_rating(100.0), 60);
        assert_eq!(utilization_rating(85.0), 20);
        assert_eq!(utilization_rating(50.0), 40);
        assert_eq!(utilization_rating(10.0), 60);
        assert_eq!(utilization_rating(0.5), 0);
        assert_eq!(utilization_rating(0.0), 0);
    }

    #[test]
    fn test_combined_rating() {
        assert_eq!(utilization_combined_rating(50.0, 10.0), 50);
        assert_eq!(utilization_combined_rating(50.0, 0.0), 0);
        assert_eq!(utilization_combined_rating(85.0, 50.0), 30);
    }

    #[test]
    fn test_efficiency_estimate() {
        assert_eq!(efficiency_improvement_estimate(10.0, 10.0).as_deref(), Some("2x-2.4x"));
        assert_eq!(efficiency_improvement_estimate(50.0, 50.0).as_deref(), Some("10-30%"));
        assert_eq!(efficiency_improvement_estimate(70.0, 70.0).as_deref(), Some("up to 10%"));
        assert_eq!(efficiency_improvement_estimate(90.0, 10.0), None);
        assert_eq!(efficiency_improvement_estimate(0.0, 10.0), None);
    }

    #[test]
    fn test_efficiency_rate() {
        assert_eq!(efficiency_rate(50.0, 0.0), None);
        assert_eq!(efficiency_rate(0.0, 50.0), Some(0));
        assert_eq!(efficiency_rate(50.0, 50.0), Some(50));
        assert_eq!(efficiency_rate(250.0, 50.0), Some(80));
    }

    #[test]
    fn test_conclusion() {
        assert_eq!(conclusion(Some(RiskLevel::High), Some(10)), Conclusion::ReliabilityRisk);
        assert_eq!(conclusion(Some(RiskLevel::Medium), Some(10)), Conclusion::ExcessiveCost);
        assert_eq!(conclusion(Some(RiskLevel::Low), Some(90)), Conclusion::Ok);
        assert_eq!(conclusion(Some(RiskLevel::Medium), Some(90)), Conclusion::InsufficientData);
        assert_eq!(conclusion(None, None), Conclusion::InsufficientData);
    }
}
