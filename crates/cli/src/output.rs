//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::{Color, Colorize};
use ignite_lib::analysis::is_qualified;
use ignite_lib::collector::ProgressInfo;
use ignite_lib::{
    flags_string, rate_to_string, risk_to_string, App, AppSettings, Conclusion, RiskLevel,
};
use serde::Deserialize;
use std::time::Duration;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

/// Output format for analysis results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One row per application (default)
    #[default]
    Table,
    /// Full analysis per application
    Detail,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Applications selected for display plus an optional notice for the user
#[derive(Debug)]
pub struct Selection<'a> {
    pub apps: Vec<&'a App>,
    pub notice: Option<String>,
}

/// Apply `--hide-blocked`. A targeted deployment is always shown.
pub fn select_visible(apps: &[App], hide_blocked: bool, targeted: bool) -> Selection<'_> {
    if !hide_blocked || targeted {
        return Selection {
            apps: apps.iter().collect(),
            notice: None,
        };
    }

    let qualified: Vec<&App> = apps.iter().filter(|a| is_qualified(a)).collect();
    if qualified.is_empty() {
        return Selection {
            apps: apps.iter().collect(),
            notice: Some(
                "No applications meet optimization prerequisites. Showing all applications"
                    .to_string(),
            ),
        };
    }

    let skipped = apps.len() - qualified.len();
    let notice = (skipped > 0).then(|| {
        format!(
            "{} applications were not shown as they don't meet optimization prerequisites. \
             Remove the --hide-blocked option to see all apps",
            skipped
        )
    });
    Selection {
        apps: qualified,
        notice,
    }
}

/// Render applications in the requested format
pub fn render(apps: &[&App], format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Table => render_table(apps),
        OutputFormat::Detail => render_detail(apps),
        OutputFormat::Json => serde_json::to_string_pretty(apps)?,
        OutputFormat::Yaml => serde_yaml::to_string(apps)?,
    })
}

#[derive(Tabled)]
struct AppRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Deployment")]
    deployment: String,
    #[tabled(rename = "Efficiency Rate")]
    efficiency: String,
    #[tabled(rename = "Reliability Risk")]
    risk: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Mem")]
    memory: String,
    #[tabled(rename = "Analysis")]
    analysis: String,
}

impl AppRow {
    fn new(app: &App) -> Self {
        let color = row_color(app);
        let paint = |s: String| s.color(color).to_string();
        Self {
            namespace: paint(app.metadata.namespace.clone()),
            deployment: paint(app.metadata.workload.clone()),
            efficiency: paint(rate_to_string(app.analysis.efficiency_rate)),
            risk: paint(risk_to_string(app.analysis.reliability_risk)),
            replicas: paint(format!("{:.0}", app.metrics.average_replicas)),
            cpu: paint(format!("{:.0}%", app.metrics.cpu_utilization)),
            memory: paint(format!("{:.0}%", app.metrics.memory_utilization)),
            analysis: paint(app.analysis.conclusion.to_string()),
        }
    }
}

/// Row color: risk first, then efficiency
fn row_color(app: &App) -> Color {
    match app.analysis.reliability_risk {
        Some(RiskLevel::Medium) => Color::Yellow,
        Some(risk) if risk > RiskLevel::Medium => Color::Red,
        _ => match app.analysis.efficiency_rate {
            Some(rate) if rate >= 60 => Color::Green,
            _ => Color::Yellow,
        },
    }
}

fn render_table(apps: &[&App]) -> String {
    if apps.is_empty() {
        return "No applications found".yellow().to_string();
    }
    let rows: Vec<AppRow> = apps.iter().map(|a| AppRow::new(a)).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

fn efficiency_colored(rate: Option<i32>) -> String {
    let text = rate_to_string(rate);
    match rate {
        Some(r) if r >= 90 => text.red().to_string(),
        Some(r) if r >= 60 => text.green().to_string(),
        _ => text.yellow().to_string(),
    }
}

fn risk_colored(risk: Option<RiskLevel>) -> String {
    let text = risk_to_string(risk);
    match risk {
        Some(RiskLevel::None | RiskLevel::Low) => text.green().to_string(),
        Some(RiskLevel::Medium) => text.yellow().to_string(),
        Some(_) => text.red().to_string(),
        None => text,
    }
}

fn conclusion_colored(conclusion: Conclusion) -> String {
    let text = conclusion.to_string();
    match conclusion {
        Conclusion::ReliabilityRisk => text.red().to_string(),
        Conclusion::ExcessiveCost => text.yellow().to_string(),
        Conclusion::Ok => text.green().to_string(),
        Conclusion::InsufficientData => text,
    }
}

fn render_app_detail(app: &App) -> String {
    let a = &app.analysis;
    let mut builder = Builder::default();
    let mut row = |key: &str, value: String| builder.push_record([key.to_string(), value]);

    row("Namespace", app.metadata.namespace.clone());
    row("Deployment", app.metadata.workload.clone());
    row(
        "Kind",
        format!("{} ({})", app.metadata.workload_kind, app.metadata.workload_api_version),
    );
    row("Main Container", a.main_container.clone());
    row(
        "Pod QoS Class",
        app.settings
            .qos_class
            .map(|q| q.title().to_string())
            .unwrap_or_else(|| "n/a".to_string()),
    );
    row("Average Replica Count", format!("{:3.1}", app.metrics.average_replicas));
    row("Container Count", app.containers.len().to_string());
    row("Autoscaling", autoscaling_string(&app.settings));
    row("CPU Utilization", format!("{:.0}%", app.metrics.cpu_utilization));
    row("Memory Utilization", format!("{:.0}%", app.metrics.memory_utilization));
    row("Network Traffic (approx.)", format!("{:3.1} req/sec", app.metrics.request_rate));
    row("Flags", flags_string(&a.flags));
    row("Efficiency Rate", efficiency_colored(a.efficiency_rate));
    row("Reliability Risk", risk_colored(a.reliability_risk));
    row("Analysis", conclusion_colored(a.conclusion));

    let lists = [
        ("Opportunities", &a.opportunities, Color::Green),
        ("Cautions", &a.cautions, Color::Yellow),
        ("Blockers", &a.blockers, Color::Red),
        ("Recommendations", &a.recommendations, Color::Cyan),
    ];
    for (key, items, color) in lists {
        if !items.is_empty() {
            row(key, items.join("\n").color(color).to_string());
        }
    }

    builder.build().with(Style::blank()).to_string()
}

fn autoscaling_string(settings: &AppSettings) -> String {
    let mut parts = Vec::new();
    if settings.hpa_enabled {
        parts.push(format!(
            "HPA ({}-{} replicas)",
            settings.hpa_min_replicas, settings.hpa_max_replicas
        ));
    }
    if settings.vpa_enabled {
        parts.push("VPA".to_string());
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

fn render_detail(apps: &[&App]) -> String {
    if apps.is_empty() {
        return "No applications found".yellow().to_string();
    }
    apps.iter()
        .map(|a| render_app_detail(a))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Progress line for stderr, rewritten in place with `\r`
pub fn progress_line(info: &ProgressInfo, elapsed: Duration) -> String {
    format!(
        "\rCollecting data ({:.1}s): {} of {} namespace(s) and {} of {} application(s) completed... ",
        elapsed.as_secs_f64(),
        info.namespaces_done,
        info.namespaces_total,
        info.workloads_done,
        info.workloads_total
    )
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}
