//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `homeflow.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::path::PathBuf;
use std::time::Duration;

use homeflow_app::action_executor::ExecutionOptions;
use homeflow_app::condition_evaluator::ConditionConfig;
use homeflow_app::geofence_service::GeofenceConfig;
use homeflow_app::scheduler::SchedulerConfig;
use homeflow_domain::geo::Coordinates;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Action executor defaults.
    pub executor: ExecutorSection,
    /// Scheduler settings.
    pub scheduler: SchedulerSection,
    /// Condition evaluator settings.
    pub conditions: ConditionsSection,
    /// Geofence monitoring settings.
    pub geofence: GeofenceSection,
    /// Where the state snapshot lives.
    pub state: StateSection,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub parallel: bool,
    pub rollback: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub execution_timeout_secs: u64,
    pub heartbeat_secs: u64,
    pub drift_threshold_secs: u64,
    pub history_capacity: usize,
    /// Home latitude; sun triggers need both coordinates.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConditionsSection {
    pub cooldown_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeofenceSection {
    /// Fixes less accurate than this (metres) are ignored.
    pub min_accuracy_m: f64,
    pub poll_interval_secs: u64,
}

/// State snapshot location.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StateSection {
    /// JSON file holding devices, automations, flows and geofences.
    pub path: PathBuf,
}

impl Config {
    /// Load configuration from `homeflow.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("homeflow.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HOMEFLOW_STATE") {
            self.state.path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("HOMEFLOW_LATITUDE") {
            if let Ok(lat) = val.parse() {
                self.scheduler.latitude = Some(lat);
            }
        }
        if let Ok(val) = std::env::var("HOMEFLOW_LONGITUDE") {
            if let Ok(lng) = val.parse() {
                self.scheduler.longitude = Some(lng);
            }
        }
        if let Ok(val) = std::env::var("HOMEFLOW_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.executor.max_retries = retries;
            }
        }
        if let Ok(val) = std::env::var("HOMEFLOW_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "executor.timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.scheduler.heartbeat_secs == 0 {
            return Err(ConfigError::Validation(
                "scheduler.heartbeat_secs must be non-zero".to_string(),
            ));
        }
        if self.scheduler.history_capacity == 0 {
            return Err(ConfigError::Validation(
                "scheduler.history_capacity must be non-zero".to_string(),
            ));
        }
        match (self.scheduler.latitude, self.scheduler.longitude) {
            (None, None) => {}
            (Some(lat), Some(lng)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                    return Err(ConfigError::Validation(format!(
                        "location {lat},{lng} is out of range"
                    )));
                }
            }
            _ => {
                return Err(ConfigError::Validation(
                    "scheduler.latitude and scheduler.longitude go together".to_string(),
                ));
            }
        }
        if self.geofence.min_accuracy_m <= 0.0 {
            return Err(ConfigError::Validation(
                "geofence.min_accuracy_m must be positive".to_string(),
            ));
        }
        if self.geofence.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "geofence.poll_interval_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions::default()
            .with_max_retries(self.executor.max_retries)
            .with_retry_delay(Duration::from_millis(self.executor.retry_delay_ms))
            .with_timeout(Duration::from_millis(self.executor.timeout_ms))
            .with_parallel(self.executor.parallel)
            .with_rollback(self.executor.rollback)
    }

    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            execution_timeout: Duration::from_secs(self.scheduler.execution_timeout_secs),
            heartbeat: Duration::from_secs(self.scheduler.heartbeat_secs),
            drift_threshold: Duration::from_secs(self.scheduler.drift_threshold_secs),
            history_capacity: self.scheduler.history_capacity,
            location: self.location(),
        }
    }

    #[must_use]
    pub fn condition_config(&self) -> ConditionConfig {
        ConditionConfig {
            cooldown: Duration::from_secs(self.conditions.cooldown_secs),
        }
    }

    #[must_use]
    pub fn geofence_config(&self) -> GeofenceConfig {
        GeofenceConfig {
            min_accuracy: self.geofence.min_accuracy_m,
            poll_interval: Duration::from_secs(self.geofence.poll_interval_secs),
            ..GeofenceConfig::default()
        }
    }

    /// Home coordinates, when both are configured.
    #[must_use]
    pub fn location(&self) -> Option<Coordinates> {
        match (self.scheduler.latitude, self.scheduler.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "homeflowd=info,homeflow=info".to_string(),
        }
    }
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_ms: 5000,
            parallel: false,
            rollback: false,
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            execution_timeout_secs: 30,
            heartbeat_secs: 60,
            drift_threshold_secs: 5,
            history_capacity: 1000,
            latitude: None,
            longitude: None,
        }
    }
}

impl Default for ConditionsSection {
    fn default() -> Self {
        Self { cooldown_secs: 60 }
    }
}

impl Default for GeofenceSection {
    fn default() -> Self {
        Self {
            min_accuracy_m: 100.0,
            poll_interval_secs: 30,
        }
    }
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("homeflow.json"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
