//! Kubernetes workload optimization analyzer
//!
//! Queries a Prometheus server for workload telemetry, scores every
//! deployment as an optimization candidate and prints the results.

mod config;
mod output;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use ignite_lib::analysis::{analyze_apps, opportunity_order};
use ignite_lib::collector::{collect_all, run_with_progress, CollectionRequest, WorkloadRef};
use ignite_lib::prometheus::{MetricsSource, PrometheusClient, TimeRange};
use ignite_lib::{cancel_pair, CollectorMetrics, StructuredLogger};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Settings;
use crate::output::OutputFormat;

/// Kubernetes workload optimization analyzer
#[derive(Parser)]
#[command(name = "kube-ignite")]
#[command(author, version, about = "Find Kubernetes workloads worth optimizing", long_about = None)]
pub struct Cli {
    /// Namespace to analyze (all non-system namespaces if omitted)
    pub namespace: Option<String>,

    /// Deployment to analyze within the namespace
    pub deployment: Option<String>,

    /// Prometheus API base URL
    #[arg(long, short = 'p', env = "IGNITE_PROMETHEUS_URL")]
    pub prometheus_url: Option<String>,

    /// Config file (default is $HOME/.kube-ignite.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Analysis window start: RFC3339, `now` or `-<duration>` like `-7d`
    #[arg(long)]
    pub start: Option<String>,

    /// Analysis window end
    #[arg(long)]
    pub end: Option<String>,

    /// Query resolution like `1h` or `1d`
    #[arg(long)]
    pub step: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub output: Option<OutputFormat>,

    /// Hide applications that don't meet optimization prerequisites
    #[arg(long)]
    pub hide_blocked: bool,

    /// Log everything, including trace output
    #[arg(long)]
    pub debug: bool,

    /// Log errors only
    #[arg(long, short, conflicts_with = "debug")]
    pub quiet: bool,

    /// Write collector self-metrics to the log when done
    #[arg(long)]
    pub dump_metrics: bool,

    /// Log file
    #[arg(long, default_value = "kube-ignite.log")]
    pub log_file: PathBuf,
}

impl Cli {
    /// Command-line flags override file and environment settings
    fn apply(&self, settings: &mut Settings) {
        if let Some(url) = &self.prometheus_url {
            settings.prometheus_url = Some(url.clone());
        }
        if let Some(output) = self.output {
            settings.output = output;
        }
        if self.hide_blocked {
            settings.hide_blocked = true;
        }
        if let Some(start) = &self.start {
            settings.start = start.clone();
        }
        if let Some(end) = &self.end {
            settings.end = end.clone();
        }
        if let Some(step) = &self.step {
            settings.step = step.clone();
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        "trace"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.log_file)
        .with_context(|| format!("Failed to open log file {}", cli.log_file.display()))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(fmt::layer().json().with_writer(Mutex::new(file)))
        .init();
    Ok(())
}

fn display_config(url: &str, namespace: Option<&str>, deployment: Option<&str>, range: &TimeRange) {
    eprintln!("Using Prometheus API at {}", url);
    match (namespace, deployment) {
        (Some(ns), Some(d)) => eprintln!("Analyzing namespace {}, deployment {}", ns, d),
        (Some(ns), None) => eprintln!("Analyzing all deployments in namespace {}", ns),
        _ => eprintln!("Analyzing all deployments in all non-system namespaces"),
    }
    eprintln!(
        "From {} to {} in increments of {}s.",
        range.start.to_rfc3339(),
        range.end.to_rfc3339(),
        range.step.as_secs()
    );
    eprintln!();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);

    let url = settings
        .prometheus_url
        .clone()
        .context("Prometheus URL is required (--prometheus-url or IGNITE_PROMETHEUS_URL)")?;
    let range = settings.time_range(Utc::now())?;
    let client = PrometheusClient::new(&url)?;

    let namespace = cli.namespace.as_deref();
    let deployment = cli.deployment.as_deref();
    display_config(&url, namespace, deployment, &range);
    info!(
        prometheus = %url,
        namespace = namespace.unwrap_or("*"),
        deployment = deployment.unwrap_or("*"),
        "Starting analysis"
    );

    let mut request = CollectionRequest::all(range);
    if let Some(ns) = namespace {
        request = request.namespace(ns);
    }
    if let Some(d) = deployment {
        request = request.workload(WorkloadRef::deployment(d));
    }

    let (cancel, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding queries");
            cancel.cancel();
        }
    });

    let source: Arc<dyn MetricsSource> = Arc::new(client);
    let logger = StructuredLogger::new(source.describe());
    let started = Instant::now();
    let collected = run_with_progress(
        move |progress| collect_all(source, request, progress, signal),
        |info, done| {
            eprint!("{}", output::progress_line(&info, started.elapsed()));
            if done {
                eprintln!("done.\n");
            }
        },
    )
    .await;
    let mut apps =
        collected.with_context(|| format!("Failed to obtain data from Prometheus at {}", url))?;

    if apps.is_empty() {
        match (namespace, deployment) {
            (Some(ns), Some(d)) => output::print_warning(&format!(
                "Application {:?} not found in namespace {:?}",
                d, ns
            )),
            _ => output::print_warning(
                "No applications found. Try specifying an explicit namespace or a different time window",
            ),
        }
        return Ok(());
    }

    analyze_apps(&mut apps, &logger);
    apps.sort_by(opportunity_order);

    let selection = output::select_visible(&apps, settings.hide_blocked, deployment.is_some());
    println!("{}", output::render(&selection.apps, settings.output)?);
    if let Some(notice) = selection.notice {
        output::print_info(&notice);
    }

    if cli.dump_metrics {
        let metrics = CollectorMetrics::new().render()?;
        info!(metrics = %metrics, "Collector self-metrics");
    }

    Ok(())
}
