//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup and fails fast on values that do not parse.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// How often idle statuses are cleaned up unless configured otherwise.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Config {
    pub workers: WorkersConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Settings for one [`AsyncWorkers`](crate::engine::AsyncWorkers) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkersConfig {
    /// Name used in log records and metric labels.
    pub name: String,
    /// Period of the idle status cleanup loop.
    pub cleanup_interval: Duration,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            name: "qosagent".to_string(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

/// On-disk layout. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    workers: FileWorkers,
    otel_endpoint: Option<String>,
    log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileWorkers {
    name: Option<String>,
    cleanup_interval_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = WorkersConfig::default();
        let cleanup_interval = match std::env::var("QOSAGENT_CLEANUP_INTERVAL_SECS") {
            Ok(raw) => parse_interval_secs("QOSAGENT_CLEANUP_INTERVAL_SECS", &raw)?,
            Err(_) => defaults.cleanup_interval,
        };

        Ok(Self {
            workers: WorkersConfig {
                name: std::env::var("QOSAGENT_WORKERS_NAME").unwrap_or(defaults.name),
                cleanup_interval,
            },
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Load configuration from a TOML file.
    ///
    /// ```toml
    /// log_level = "debug"
    ///
    /// [workers]
    /// name = "cpu-advisor"
    /// cleanup_interval_secs = 30
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad config {}: {e}", path.display())))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.message().to_string()))?;
        let defaults = WorkersConfig::default();

        let cleanup_interval = match file.workers.cleanup_interval_secs {
            Some(0) => {
                return Err(Error::Config(
                    "workers.cleanup_interval_secs must be positive".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.cleanup_interval,
        };

        Ok(Self {
            workers: WorkersConfig {
                name: file.workers.name.unwrap_or(defaults.name),
                cleanup_interval,
            },
            otel_endpoint: file.otel_endpoint,
            log_level: file.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_interval_secs(name: &str, raw: &str) -> Result<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::Config(format!(
            "{name} must be a positive number of seconds, got {raw:?}"
        ))),
    }
}
