//! Workload optimization analysis library
//!
//! This crate provides the core functionality for:
//! - Querying workload telemetry from a Prometheus-compatible backend
//! - Reducing noisy time series to representative values
//! - Concurrent per-namespace collection with progress reporting
//! - Scoring workloads as optimization candidates
//! - Observability of the collection itself

pub mod analysis;
pub mod cancel;
pub mod collector;
pub mod error;
pub mod models;
pub mod observability;
pub mod prometheus;
pub mod stats;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use error::{ConfigError, QueryError, StatsError};
pub use models::*;
pub use observability::{CollectorMetrics, StructuredLogger};
