//! Container and application analysis
//!
//! Pure functions over collected [`App`] records. Running the analysis twice
//! on the same record yields the same result.

mod containers;
mod scoring;

pub use containers::{
    analyze_containers, calc_saturation, compute_qos, identify_main_container, pseudo_cost,
    resources_limited,
};
pub use scoring::{
    conclusion, efficiency_improvement_estimate, efficiency_rate, is_qualified,
    opportunity_order, risk_assessment, score, utilization_combined_rating, utilization_rating,
};

use crate::models::App;
use crate::observability::StructuredLogger;
use crate::stats::magic_round;
use tracing::warn;

/// Finalize derived settings and metrics ahead of scoring
fn pre_analyze(app: &mut App) {
    analyze_containers(app);

    if app.analysis.main_container.is_empty() {
        app.analysis.main_container = identify_main_container(app);
    }

    // main container saturation replaces pod-level utilization
    if let Some(i) = app.container_index_by_name(&app.analysis.main_container) {
        let main = &app.containers[i];
        if main.cpu.resource.saturation > 0.0 {
            app.metrics.cpu_utilization = main.cpu.resource.saturation * 100.0;
        }
        if main.memory.resource.saturation > 0.0 {
            app.metrics.memory_utilization = main.memory.resource.saturation * 100.0;
        }
    }

    let computed = compute_qos(app);
    match app.settings.qos_class {
        None => app.settings.qos_class = Some(computed),
        Some(known) if known != computed => {
            warn!(
                app = %app.metadata,
                computed = computed.as_str(),
                discovered = known.as_str(),
                "Computed QoS class differs from discovered one; keeping discovered"
            );
        }
        Some(_) => {}
    }

    app.metrics.cpu_seconds_throttled =
        app.containers.iter().map(|c| c.cpu.seconds_throttled).sum();

    // packets received approximate requests when traffic flows both ways
    if app.metrics.request_rate == 0.0
        && app.metrics.packet_receive_rate > 0.0
        && app.metrics.packet_transmit_rate > 0.0
    {
        app.metrics.request_rate = magic_round(app.metrics.packet_receive_rate);
    }
}

/// Analyze one application in place
pub fn analyze_app(app: &mut App) {
    pre_analyze(app);
    app.analysis = score(app);
}

/// Analyze every application, logging one event per record
pub fn analyze_apps(apps: &mut [App], logger: &StructuredLogger) {
    for app in apps.iter_mut() {
        analyze_app(app);
        logger.log_app_analyzed(
            &app.metadata.to_string(),
            app.analysis.rating,
            app.analysis.confidence,
            &app.analysis.conclusion.to_string(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AppAnalysis, AppContainer, AppFlag, AppMetadata, Conclusion, QosClass, RiskLevel,
    };

    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

    /// Single guaranteed container at half utilization with steady traffic
    fn healthy_app() -> App {
        let mut app = App::new(AppMetadata::deployment("shop", "web"));
        let mut c = AppContainer::new("web");
        c.cpu.resource.request = 1.0;
        c.cpu.resource.limit = 1.0;
        c.cpu.resource.usage = 0.5;
        c.memory.resource.request = GIB;
        c.memory.resource.limit = GIB;
        c.memory.resource.usage = 0.5 * GIB;
        app.containers.push(c);
        app.metrics.average_replicas = 3.0;
        app.metrics.packet_receive_rate = 50.0;
        app.metrics.packet_transmit_rate = 40.0;
        app
    }

    #[test]
    fn test_healthy_app_is_ok() {
        let mut app = healthy_app();
        analyze_app(&mut app);
        let a = &app.analysis;

        assert_eq!(a.main_container, "web");
        assert_eq!(app.settings.qos_class, Some(QosClass::Guaranteed));
        assert_eq!(app.metrics.cpu_utilization, 50.0);
        assert_eq!(app.metrics.memory_utilization, 50.0);
        assert_eq!(app.metrics.request_rate, 50.0);
        assert!(a.blockers.is_empty(), "{:?}", a.blockers);
        assert_eq!(a.rating, 40);
        assert_eq!(a.confidence, 30);
        assert_eq!(a.efficiency_rate, Some(50));
        assert_eq!(a.reliability_risk, Some(RiskLevel::Low));
        // efficiency below 60 outranks a low risk
        assert_eq!(a.conclusion, Conclusion::ExcessiveCost);
        assert_eq!(a.opportunities, vec!["Improve efficiency by 10-30%"]);
        assert_eq!(a.recommendations, vec!["Optimize to improve efficiency"]);
        assert!(a.flag(AppFlag::MainContainer));
        assert!(a.flag(AppFlag::ResourceGuaranteed));
        assert!(a.flag(AppFlag::ResourceLimits));
        assert!(a.flag(AppFlag::Traffic));
        assert!(!a.flag(AppFlag::MultiContainer));
    }

    #[test]
    fn test_well_utilized_app_concludes_ok() {
        let mut app = healthy_app();
        app.containers[0].cpu.resource.usage = 0.85;
        app.containers[0].memory.resource.usage = 0.85 * GIB;
        analyze_app(&mut app);

        assert_eq!(app.analysis.efficiency_rate, Some(85));
        assert_eq!(app.analysis.reliability_risk, Some(RiskLevel::Low));
        assert_eq!(app.analysis.conclusion, Conclusion::Ok);
        assert!(app.analysis.recommendations.is_empty());
    }

    #[test]
    fn test_writeable_volume_blocks() {
        let mut app = healthy_app();
        app.settings.writeable_volume = true;
        analyze_app(&mut app);

        assert_eq!(app.analysis.rating, -100);
        assert_eq!(app.analysis.confidence, 100);
        assert!(app.analysis.flag(AppFlag::WriteableVolume));
        assert!(app
            .analysis
            .blockers
            .contains(&"Stateful: pods have writeable volumes".to_string()));
        assert!(app.analysis.recommendations.is_empty());
    }

    #[test]
    fn test_no_containers_blocks_on_main_container() {
        let mut app = App::new(AppMetadata::deployment("shop", "ghost"));
        analyze_app(&mut app);
        let a = &app.analysis;

        assert_eq!(a.main_container, "");
        assert_eq!(a.blockers[0], "Could not identify main container");
        assert!(!a.flag(AppFlag::MainContainer));
        assert!(!a.flags.contains_key(&AppFlag::MultiContainer));
        assert!(a.blockers.contains(&"No requests are being processed".to_string()));
        assert!(a.cautions.contains(&"Idle application".to_string()));
        assert_eq!(a.efficiency_rate, None);
        assert_eq!(app.settings.qos_class, Some(QosClass::BestEffort));
        assert_eq!(a.reliability_risk, Some(RiskLevel::High));
        assert_eq!(a.conclusion, Conclusion::ReliabilityRisk);
        assert_eq!(a.rating, -100);
    }

    #[test]
    fn test_missing_cpu_spec() {
        let mut app = healthy_app();
        app.containers[0].cpu.resource.request = 0.0;
        app.containers[0].cpu.resource.limit = 0.0;
        analyze_app(&mut app);

        assert!(!app.analysis.flag(AppFlag::ResourceSpec));
        assert!(app
            .analysis
            .blockers
            .iter()
            .any(|b| b.starts_with("CPU resources not specified")));
        assert!(app
            .analysis
            .recommendations
            .contains(&"Define resource levels to improve reliability".to_string()));
        assert_eq!(app.settings.qos_class, Some(QosClass::Burstable));
    }

    #[test]
    fn test_many_replicas_and_burst() {
        let mut app = healthy_app();
        app.metrics.average_replicas = 8.0;
        app.metrics.packet_receive_rate = 500.0;
        app.containers[0].cpu.resource.usage = 1.3;
        analyze_app(&mut app);
        let a = &app.analysis;

        assert!(a.flag(AppFlag::Burst));
        assert!(a.flag(AppFlag::ManyReplicas));
        assert!(!a.flag(AppFlag::SingleReplica));
        assert_eq!(a.opportunities, vec!["Improve performance/reliability"]);
        // 50 (utilization) + 10 (traffic) + 20 (replicas)
        assert_eq!(a.rating, 80);
        assert_eq!(a.confidence, 60);
        assert_eq!(a.reliability_risk, Some(RiskLevel::High));
        assert_eq!(a.conclusion, Conclusion::ReliabilityRisk);
    }

    #[test]
    fn test_single_replica_and_low_traffic() {
        let mut app = healthy_app();
        app.metrics.average_replicas = 1.0;
        app.metrics.packet_receive_rate = 1.0;
        analyze_app(&mut app);
        let a = &app.analysis;

        assert!(a.flag(AppFlag::SingleReplica));
        assert!(!a.flag(AppFlag::ManyReplicas));
        assert!(!a.flags.contains_key(&AppFlag::Traffic));
        // 40 - 10 - 20
        assert_eq!(a.rating, 10);
        assert!(a.cautions.contains(&"Low request rate".to_string()));
        assert!(a.cautions.contains(&"Less than 2 replicas".to_string()));
    }

    #[test]
    fn test_discovered_qos_wins() {
        let mut app = healthy_app();
        app.settings.qos_class = Some(QosClass::Burstable);
        analyze_app(&mut app);
        assert_eq!(app.settings.qos_class, Some(QosClass::Burstable));
        assert_eq!(app.analysis.reliability_risk, Some(RiskLevel::Medium));
        assert!(!app.analysis.flag(AppFlag::ResourceGuaranteed));
    }

    #[test]
    fn test_throttling_rolls_up() {
        let mut app = healthy_app();
        let mut sidecar = AppContainer::new("proxy");
        sidecar.cpu.seconds_throttled = 0.5;
        app.containers[0].cpu.seconds_throttled = 0.25;
        app.containers.push(sidecar);
        analyze_app(&mut app);

        assert_eq!(app.metrics.cpu_seconds_throttled, 0.75);
        assert_eq!(app.analysis.reliability_risk, Some(RiskLevel::High));
        assert!(app
            .analysis
            .cautions
            .contains(&"Resource utilization significantly exceeds allocation".to_string()));
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let mut app = healthy_app();
        analyze_app(&mut app);
        let first = app.clone();
        analyze_app(&mut app);
        assert_eq!(app, first);
    }

    #[test]
    fn test_rating_and_confidence_bounds() {
        let mut app = healthy_app();
        app.metrics.average_replicas = 20.0;
        app.metrics.request_rate = 1000.0;
        app.containers[0].cpu.resource.usage = 0.1;
        app.containers[0].memory.resource.usage = 0.1 * GIB;
        analyze_app(&mut app);
        assert!((-100..=100).contains(&app.analysis.rating));
        assert!((0..=100).contains(&app.analysis.confidence));
        assert_eq!(app.analysis.rating, 90);
    }

    #[test]
    fn test_opportunity_order() {
        let mut apps: Vec<App> = [
            ("b", "x", 50, 30),
            ("a", "y", 50, 60),
            ("a", "z", -100, 100),
            ("a", "w", -100, 40),
        ]
        .iter()
        .map(|(ns, w, rating, confidence)| {
            let mut app = App::new(AppMetadata::deployment(*ns, *w));
            app.analysis.rating = *rating;
            app.analysis.confidence = *confidence;
            app
        })
        .collect();
        apps.sort_by(opportunity_order);

        let order: Vec<_> = apps.iter().map(|a| a.metadata.workload.as_str()).collect();
        assert_eq!(order, vec!["y", "x", "w", "z"]);
        assert!(is_qualified(&apps[0]));
        assert!(!is_qualified(&apps[3]));
    }

    /// Guaranteed app with the given utilization and throttling, no traffic concerns
    fn risk_for(utilization: f64, throttled: f64) -> (RiskLevel, Vec<String>) {
        let mut app = healthy_app();
        app.settings.qos_class = Some(QosClass::Guaranteed);
        app.metrics.cpu_utilization = utilization;
        app.metrics.memory_utilization = 50.0;
        app.metrics.cpu_seconds_throttled = throttled;
        risk_assessment(&app)
    }

    #[test]
    fn test_risk_utilization_boundaries() {
        assert_eq!(risk_for(90.0, 0.0).0, RiskLevel::Low);
        assert_eq!(risk_for(90.5, 0.0).0, RiskLevel::Medium);
        assert_eq!(risk_for(120.0, 0.0).0, RiskLevel::Medium);

        let (risk, cautions) = risk_for(120.5, 0.0);
        assert_eq!(risk, RiskLevel::High);
        assert_eq!(cautions, vec!["Resource utilization exceeds allocation"]);

        assert_eq!(risk_for(199.0, 0.0).0, RiskLevel::High);
        let (risk, cautions) = risk_for(200.0, 0.0);
        assert_eq!(risk, RiskLevel::High);
        assert_eq!(cautions, vec!["Resource utilization significantly exceeds allocation"]);
    }

    #[test]
    fn test_risk_throttling_boundaries() {
        assert_eq!(risk_for(50.0, 0.1).0, RiskLevel::Low);
        let (risk, cautions) = risk_for(50.0, 0.11);
        assert_eq!(risk, RiskLevel::Medium);
        assert_eq!(cautions, vec!["Resource utilization close to allocation"]);

        assert_eq!(risk_for(50.0, 0.24).0, RiskLevel::Medium);
        let (risk, cautions) = risk_for(50.0, 0.25);
        assert_eq!(risk, RiskLevel::High);
        assert_eq!(cautions, vec!["Resource utilization exceeds allocation"]);

        assert_eq!(risk_for(50.0, 0.69).1, vec!["Resource utilization exceeds allocation"]);
        let (risk, cautions) = risk_for(50.0, 0.7);
        assert_eq!(risk, RiskLevel::High);
        assert_eq!(cautions, vec!["Resource utilization significantly exceeds allocation"]);
    }

    #[test]
    fn test_throttling_at_quarter_second_is_high_risk() {
        let mut app = healthy_app();
        app.containers[0].cpu.seconds_throttled = 0.25;
        analyze_app(&mut app);
        assert_eq!(app.analysis.reliability_risk, Some(RiskLevel::High));
        assert_eq!(app.analysis.conclusion, Conclusion::ReliabilityRisk);
    }

    #[test]
    fn test_efficiency_threshold_for_excessive_cost() {
        assert_eq!(conclusion(Some(RiskLevel::Low), Some(60)), Conclusion::Ok);
        assert_eq!(conclusion(Some(RiskLevel::Low), Some(59)), Conclusion::ExcessiveCost);
        assert_eq!(conclusion(Some(RiskLevel::Medium), Some(60)), Conclusion::InsufficientData);
        assert_eq!(conclusion(Some(RiskLevel::High), Some(10)), Conclusion::ReliabilityRisk);
        assert_eq!(conclusion(None, None), Conclusion::InsufficientData);
    }

    /// Score with explicit utilization, bypassing saturation-derived values
    fn scored_with_utilization(cpu: f64, memory: f64) -> AppAnalysis {
        let mut app = healthy_app();
        app.analysis.main_container = "web".to_string();
        app.settings.qos_class = Some(QosClass::Guaranteed);
        app.metrics.cpu_utilization = cpu;
        app.metrics.memory_utilization = memory;
        app.metrics.request_rate = 50.0;
        score(&app)
    }

    #[test]
    fn test_efficiency_opportunity_needs_bump_of_thirty() {
        // (20 + 40) / 2
        let a = scored_with_utilization(85.0, 50.0);
        assert_eq!(utilization_combined_rating(85.0, 50.0), 30);
        assert_eq!(a.opportunities, vec!["Improve efficiency"]);
        assert_eq!(a.efficiency_rate, Some(71));
        assert!(!a.flag(AppFlag::Burst));

        // (20 + 20) / 2
        let a = scored_with_utilization(85.0, 85.0);
        assert_eq!(utilization_combined_rating(85.0, 85.0), 20);
        assert!(a.opportunities.is_empty(), "{:?}", a.opportunities);
        assert_eq!(a.rating, 20);
    }

    #[test]
    fn test_fully_utilized_guaranteed_container() {
        let mut app = App::new(AppMetadata::deployment("shop", "api"));
        let mut c = AppContainer::new("api");
        c.cpu.resource.request = 1.0;
        c.cpu.resource.limit = 1.0;
        c.cpu.resource.usage = 1.0;
        c.memory.resource.request = GIB;
        c.memory.resource.limit = GIB;
        c.memory.resource.usage = GIB;
        app.containers.push(c);
        app.metrics.average_replicas = 5.0;
        app.metrics.request_rate = 10.0;
        analyze_app(&mut app);
        let a = &app.analysis;

        assert_eq!(app.containers[0].cpu.resource.saturation, 1.0);
        assert_eq!(app.metrics.cpu_utilization, 100.0);
        assert_eq!(a.main_container, "api");
        assert_eq!(app.settings.qos_class, Some(QosClass::Guaranteed));
        assert!(a.blockers.is_empty(), "{:?}", a.blockers);
        assert!(a.flag(AppFlag::Burst));
        assert_eq!(a.opportunities, vec!["Improve performance/reliability"]);
        // 60 (utilization) + 10 (replicas)
        assert_eq!(a.rating, 70);
        assert_eq!(a.confidence, 40);
        assert_eq!(a.efficiency_rate, Some(100));
        // 100% utilization is above the 90% threshold
        assert_eq!(a.reliability_risk, Some(RiskLevel::Medium));
        assert_eq!(a.conclusion, Conclusion::InsufficientData);
        assert_eq!(a.recommendations, vec!["Optimize to improve reliability"]);
    }
}
