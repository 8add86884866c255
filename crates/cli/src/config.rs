//! Worker configuration.
//!
//! Values come from defaults, then an optional TOML file, then `COURIER_*`
//! environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use courier_lifecycle::TEARDOWN_MARGIN;
use courier_logistics::LogisticsConfig;
use courier_work::WorkerOptions;
use serde::{Deserialize, Serialize};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or malformed
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub lifecycle: LifecycleConfig,
    pub logging: LoggingConfig,
    pub logistics: LogisticsSection,
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Liveness endpoint port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// `[worker]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub concurrency: usize,
    pub shutdown_grace_period_ms: u64,
    pub error_channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            concurrency: 4,
            shutdown_grace_period_ms: 30_000,
            error_channel_capacity: 64,
        }
    }
}

/// `[lifecycle]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on each subsystem's teardown
    pub teardown_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            teardown_timeout_ms: 40_000,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// `[logistics]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticsSection {
    pub signatory: String,
    pub operator: String,
    pub max_transport_delay_ms: u64,
}

impl Default for LogisticsSection {
    fn default() -> Self {
        let defaults = LogisticsConfig::default();
        Self {
            signatory: defaults.signatory,
            operator: defaults.operator,
            max_transport_delay_ms: defaults.max_transport_delay.as_millis() as u64,
        }
    }
}

impl CourierConfig {
    /// Load from `path` (or defaults), apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML. Missing sections and keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `COURIER_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("COURIER_SERVER_PORT") {
            self.server.port = parse_var("COURIER_SERVER_PORT", &v)?;
        }
        if let Some(v) = lookup("COURIER_WORKER_CONCURRENCY") {
            self.worker.concurrency = parse_var("COURIER_WORKER_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("COURIER_WORKER_POLL_INTERVAL_MS") {
            self.worker.poll_interval_ms = parse_var("COURIER_WORKER_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("COURIER_WORKER_SHUTDOWN_GRACE_PERIOD_MS") {
            self.worker.shutdown_grace_period_ms =
                parse_var("COURIER_WORKER_SHUTDOWN_GRACE_PERIOD_MS", &v)?;
        }
        if let Some(v) = lookup("COURIER_WORKER_ERROR_CHANNEL_CAPACITY") {
            self.worker.error_channel_capacity =
                parse_var("COURIER_WORKER_ERROR_CHANNEL_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("COURIER_LIFECYCLE_TEARDOWN_TIMEOUT_MS") {
            self.lifecycle.teardown_timeout_ms =
                parse_var("COURIER_LIFECYCLE_TEARDOWN_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("COURIER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("COURIER_LOG_JSON") {
            self.logging.json = parse_var("COURIER_LOG_JSON", &v)?;
        }
        if let Some(v) = lookup("COURIER_LOGISTICS_SIGNATORY") {
            self.logistics.signatory = v;
        }
        if let Some(v) = lookup("COURIER_LOGISTICS_OPERATOR") {
            self.logistics.operator = v;
        }
        if let Some(v) = lookup("COURIER_LOGISTICS_MAX_TRANSPORT_DELAY_MS") {
            self.logistics.max_transport_delay_ms =
                parse_var("COURIER_LOGISTICS_MAX_TRANSPORT_DELAY_MS", &v)?;
        }
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "worker.concurrency must be at least 1".to_string(),
            ));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "worker.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.worker.error_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "worker.error_channel_capacity must be at least 1".to_string(),
            ));
        }
        let grace = Duration::from_millis(self.worker.shutdown_grace_period_ms);
        if !grace.is_zero() && grace + TEARDOWN_MARGIN > self.teardown_timeout() {
            return Err(ConfigError::Invalid(format!(
                "lifecycle.teardown_timeout_ms must be at least worker.shutdown_grace_period_ms + {}",
                TEARDOWN_MARGIN.as_millis()
            )));
        }
        Ok(())
    }

    /// Worker tuning derived from `[worker]`.
    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions::default()
            .with_poll_interval(Duration::from_millis(self.worker.poll_interval_ms))
            .with_concurrency(self.worker.concurrency)
            .with_shutdown_grace_period(Duration::from_millis(self.worker.shutdown_grace_period_ms))
            .with_error_channel_capacity(self.worker.error_channel_capacity)
    }

    /// Handler settings derived from `[logistics]`.
    pub fn logistics_config(&self) -> LogisticsConfig {
        LogisticsConfig {
            signatory: self.logistics.signatory.clone(),
            operator: self.logistics.operator.clone(),
            max_transport_delay: Duration::from_millis(self.logistics.max_transport_delay_ms),
        }
    }

    /// Per-subsystem teardown bound.
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle.teardown_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value: '{}'", key, value)))
}
