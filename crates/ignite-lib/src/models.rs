//! Core data models for workload analysis
//!
//! An [`App`] is created with metadata only by discovery, filled in by the
//! collector and finally annotated by the analysis engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a workload (namespace + workload name is the natural key)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub namespace: String,
    pub workload: String,
    pub workload_kind: String,
    pub workload_api_version: String,
}

impl AppMetadata {
    /// Metadata for a `Deployment` workload
    pub fn deployment(namespace: impl Into<String>, workload: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            workload: workload.into(),
            workload_kind: "Deployment".to_string(),
            workload_api_version: "apps/v1".to_string(),
        }
    }
}

impl fmt::Display for AppMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.workload)
    }
}

/// Pod quality-of-service class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QosClass {
    Guaranteed,
    Burstable,
    BestEffort,
}

impl QosClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            QosClass::Guaranteed => "guaranteed",
            QosClass::Burstable => "burstable",
            QosClass::BestEffort => "besteffort",
        }
    }

    /// Human-readable title, e.g. "Best Effort"
    pub fn title(&self) -> &'static str {
        match self {
            QosClass::Guaranteed => "Guaranteed",
            QosClass::Burstable => "Burstable",
            QosClass::BestEffort => "Best Effort",
        }
    }
}

impl fmt::Display for QosClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workload settings discovered from cluster state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Average replica count rounded to a whole number
    pub replicas: u32,
    pub hpa_enabled: bool,
    /// Only meaningful when `hpa_enabled`
    pub hpa_min_replicas: u32,
    pub hpa_max_replicas: u32,
    pub vpa_enabled: bool,
    pub writeable_volume: bool,
    /// `None` until discovered or computed during analysis
    pub qos_class: Option<QosClass>,
}

/// Request, limit and usage of one resource of one container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Unit for request, limit and usage
    pub unit: String,
    pub request: f64,
    pub limit: f64,
    pub usage: f64,
    /// usage/request if request>0; otherwise usage/limit if limit>0; otherwise 0 (ratio)
    pub saturation: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    #[serde(flatten)]
    pub resource: ResourceInfo,
    /// Average throttling rate across instances and time
    pub seconds_throttled: f64,
    /// Relative CPU weight from the container spec (1024 per core)
    pub shares: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    #[serde(flatten)]
    pub resource: ResourceInfo,
}

/// Per-container record; names are unique within an [`App`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppContainer {
    pub name: String,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub restart_count: f64,
    /// Relative sizing score, not real currency
    pub pseudo_cost: f64,
}

impl AppContainer {
    /// New container with the units used by the collector
    pub fn new(name: impl Into<String>) -> Self {
        let mut container = Self {
            name: name.into(),
            ..Default::default()
        };
        container.cpu.resource.unit = "cores".to_string();
        container.memory.resource.unit = "bytes".to_string();
        container
    }

    pub fn resource(&self, kind: ResourceKind) -> &ResourceInfo {
        match kind {
            ResourceKind::Cpu => &self.cpu.resource,
            ResourceKind::Memory => &self.memory.resource,
        }
    }

    pub fn resource_mut(&mut self, kind: ResourceKind) -> &mut ResourceInfo {
        match kind {
            ResourceKind::Cpu => &mut self.cpu.resource,
            ResourceKind::Memory => &mut self.memory.resource,
        }
    }

    /// Assign a collected value to the field it belongs to.
    ///
    /// Returns `false` for combinations with no backing field (memory has
    /// neither a throttling counter nor shares).
    pub fn set_field(&mut self, field: ContainerField, value: f64) -> bool {
        match field {
            ContainerField::RestartCount => self.restart_count = value,
            ContainerField::Resource(kind, ResourceField::Request) => {
                self.resource_mut(kind).request = value
            }
            ContainerField::Resource(kind, ResourceField::Limit) => {
                self.resource_mut(kind).limit = value
            }
            ContainerField::Resource(kind, ResourceField::Usage) => {
                self.resource_mut(kind).usage = value
            }
            ContainerField::Resource(kind, ResourceField::Saturation) => {
                self.resource_mut(kind).saturation = value
            }
            ContainerField::Resource(ResourceKind::Cpu, ResourceField::SecondsThrottled) => {
                self.cpu.seconds_throttled = value
            }
            ContainerField::Resource(ResourceKind::Cpu, ResourceField::Shares) => {
                self.cpu.shares = value
            }
            ContainerField::Resource(
                ResourceKind::Memory,
                ResourceField::SecondsThrottled | ResourceField::Shares,
            ) => return false,
        }
        true
    }
}

/// Resource type as reported in the `resource` label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "cpu" => Some(ResourceKind::Cpu),
            "memory" => Some(ResourceKind::Memory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceField {
    Request,
    Limit,
    Usage,
    Saturation,
    SecondsThrottled,
    Shares,
}

/// Settable per-container metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerField {
    RestartCount,
    Resource(ResourceKind, ResourceField),
}

impl fmt::Display for ContainerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerField::RestartCount => f.write_str("restart_count"),
            ContainerField::Resource(kind, field) => {
                write!(f, "{}.{:?}", kind.as_str(), field)
            }
        }
    }
}

/// App-level aggregates over the analysis window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMetrics {
    pub average_replicas: f64,
    /// Percent, can be 0 or >100
    pub cpu_utilization: f64,
    /// Percent, can be 0 or >100
    pub memory_utilization: f64,
    /// Sum of container throttling rates
    pub cpu_seconds_throttled: f64,
    /// Per second
    pub packet_receive_rate: f64,
    /// Per second
    pub packet_transmit_rate: f64,
    /// Per second
    pub request_rate: f64,
}

/// Ordinal reliability risk; `Option::None` on the analysis means unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "None",
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

/// Render an optional risk, "n/a" when unknown
pub fn risk_to_string(risk: Option<RiskLevel>) -> String {
    risk.map(|r| r.as_str().to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

/// Render an optional rate, "n/a" when unknown
pub fn rate_to_string(rate: Option<i32>) -> String {
    rate.map(|r| r.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

/// Headline verdict of an analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Conclusion {
    #[default]
    InsufficientData,
    ReliabilityRisk,
    ExcessiveCost,
    Ok,
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Conclusion::InsufficientData => "Insufficient data",
            Conclusion::ReliabilityRisk => "Reliability risk",
            Conclusion::ExcessiveCost => "Excessive cost",
            Conclusion::Ok => "OK",
        };
        f.write_str(text)
    }
}

/// Diagnostic flags; order determines the rendering order of the flag code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppFlag {
    WriteableVolume,
    ResourceSpec,
    SingleReplica,
    ManyReplicas,
    Traffic,
    Utilization,
    Burst,
    MainContainer,
    MultiContainer,
    ResourceGuaranteed,
    ResourceLimits,
}

impl AppFlag {
    pub fn code(&self) -> char {
        match self {
            AppFlag::WriteableVolume => 'V',
            AppFlag::ResourceSpec => 'R',
            AppFlag::SingleReplica => 'S',
            AppFlag::ManyReplicas => 'M',
            AppFlag::Traffic => 'T',
            AppFlag::Utilization => 'U',
            AppFlag::Burst => 'B',
            AppFlag::MainContainer => 'C',
            AppFlag::MultiContainer => 'P',
            AppFlag::ResourceGuaranteed => 'G',
            AppFlag::ResourceLimits => 'L',
        }
    }
}

/// Compact flag code: uppercase letter when set, lowercase when cleared
pub fn flags_string(flags: &BTreeMap<AppFlag, bool>) -> String {
    flags
        .iter()
        .map(|(flag, set)| {
            if *set {
                flag.code()
            } else {
                flag.code().to_ascii_lowercase()
            }
        })
        .collect()
}

/// Output of the analysis engine; always recomputable from the rest of the [`App`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppAnalysis {
    /// How suitable for optimization, -100..=100
    pub rating: i32,
    /// How confident the rating is, 0..=100
    pub confidence: i32,
    /// Container to optimize, empty if not identified
    pub main_container: String,
    pub efficiency_rate: Option<i32>,
    pub reliability_risk: Option<RiskLevel>,
    pub conclusion: Conclusion,
    pub flags: BTreeMap<AppFlag, bool>,
    pub opportunities: Vec<String>,
    pub cautions: Vec<String>,
    pub blockers: Vec<String>,
    pub recommendations: Vec<String>,
}

impl AppAnalysis {
    pub fn flag(&self, flag: AppFlag) -> bool {
        self.flags.get(&flag).copied().unwrap_or(false)
    }
}

/// The unit of analysis: one workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub metadata: AppMetadata,
    pub settings: AppSettings,
    pub containers: Vec<AppContainer>,
    pub metrics: AppMetrics,
    pub analysis: AppAnalysis,
}

impl App {
    pub fn new(metadata: AppMetadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    pub fn container_index_by_name(&self, name: &str) -> Option<usize> {
        self.containers.iter().position(|c| c.name == name)
    }
}
