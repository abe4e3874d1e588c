//! Configuration management for the CLI
//!
//! Settings are layered: built-in defaults, then an optional YAML file,
//! then `IGNITE_*` environment variables, then command-line flags.

use crate::output::OutputFormat;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ignite_lib::prometheus::TimeRange;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the home directory
pub const CONFIG_FILE_NAME: &str = ".kube-ignite.yaml";

/// Effective CLI settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Prometheus API base URL
    pub prometheus_url: Option<String>,
    pub output: OutputFormat,
    pub hide_blocked: bool,
    /// Window start: RFC3339, `now` or a relative offset like `-7d`
    pub start: String,
    pub end: String,
    /// Query step like `1h` or `1d`
    pub step: String,
}

impl Settings {
    /// Load settings from defaults, the config file and the environment.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("output", "table")?
            .set_default("hide_blocked", false)?
            .set_default("start", "-7d")?
            .set_default("end", "now")?
            .set_default("step", "1d")?;

        match path {
            Some(path) => {
                builder = builder.add_source(
                    config::File::from(path)
                        .format(config::FileFormat::Yaml)
                        .required(true),
                );
            }
            None => {
                if let Some(default) = Self::default_path() {
                    builder = builder.add_source(
                        config::File::from(default.as_path())
                            .format(config::FileFormat::Yaml)
                            .required(false),
                    );
                }
            }
        }

        let config = builder
            .add_source(config::Environment::with_prefix("IGNITE"))
            .build()
            .context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// `~/.kube-ignite.yaml`, if a home directory exists
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    /// Resolve the analysis window relative to `now`
    pub fn time_range(&self, now: DateTime<Utc>) -> Result<TimeRange> {
        let start = parse_time(&self.start, now)
            .with_context(|| format!("Invalid start time {:?}", self.start))?;
        let end = parse_time(&self.end, now)
            .with_context(|| format!("Invalid end time {:?}", self.end))?;
        let step = parse_duration(&self.step)
            .with_context(|| format!("Invalid step {:?}", self.step))?;
        Ok(TimeRange::new(start, end, step)?)
    }
}

/// Parse `<number><unit>` with unit one of `s`, `m`, `h`, `d`, `w`
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .with_context(|| format!("missing unit in {:?}", s))?;
    let (number, unit) = s.split_at(split);
    let n: u64 = number
        .parse()
        .with_context(|| format!("invalid number in {:?}", s))?;
    let secs = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 60 * 60,
        "d" => n * 24 * 60 * 60,
        "w" => n * 7 * 24 * 60 * 60,
        other => bail!("unknown unit {:?} (expected s, m, h, d or w)", other),
    };
    Ok(Duration::from_secs(secs))
}

/// Parse an RFC3339 timestamp, `now`, or an offset into the past like `-7d`
pub fn parse_time(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Some(offset) = s.strip_prefix('-') {
        let offset = ChronoDuration::from_std(parse_duration(offset)?)?;
        return Ok(now - offset);
    }
    let parsed = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("not RFC3339, `now` or `-<duration>`: {:?}", s))?;
    Ok(parsed.with_timezone(&Utc))
}
