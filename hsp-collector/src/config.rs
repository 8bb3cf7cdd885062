//! Collector configuration.
//!
//! Read from a TOML file. Every field except `routes` and `date_range` has a
//! default. Credentials may be omitted from the file, in which case they come
//! from `HSP_USERNAME` and `HSP_PASSWORD`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::collector::{CompletionOracle, TaskSpaceError, build_tasks};
use crate::domain::{DayType, DayTypeError, Route, Task, parse_day_types};
use crate::hsp::{DEFAULT_BASE_URL, HspConfig, MIN_INTERVAL_FLOOR, RetryPolicy};

/// Environment variable holding the HSP username.
pub const USERNAME_VAR: &str = "HSP_USERNAME";

/// Environment variable holding the HSP password.
pub const PASSWORD_VAR: &str = "HSP_PASSWORD";

/// Error loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no routes configured")]
    NoRoutes,

    #[error("route name {0:?} is used more than once")]
    DuplicateRoute(String),

    #[error("route with an empty name: {0}")]
    EmptyRouteName(String),

    #[error("route {route:?} starts and ends at {crs}")]
    SameStations { route: String, crs: String },

    #[error("route {route:?} has time window {window} ending before it starts")]
    InvalidTimeWindow { route: String, window: String },

    #[error("date range starts {from} after it ends {to}")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },

    #[error("invalid day types: {0}")]
    DayTypes(#[from] DayTypeError),

    #[error("invalid retry settings: {0}")]
    Retry(String),

    #[error("invalid rate limit settings: {0}")]
    RateLimit(String),

    #[error("HSP credentials missing: set [credentials] or HSP_USERNAME and HSP_PASSWORD")]
    MissingCredentials,

    #[error(transparent)]
    Tasks(#[from] TaskSpaceError),
}

/// Inclusive range of service dates to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_secs: f64,
    pub max_delay_secs: f64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_secs: 2.0,
            max_delay_secs: 60.0,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs_f64(self.initial_delay_secs),
            Duration::from_secs_f64(self.max_delay_secs),
            self.backoff_multiplier,
            self.jitter,
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Retry("max_attempts must be at least 1".into()));
        }
        for (name, value) in [
            ("initial_delay_secs", self.initial_delay_secs),
            ("max_delay_secs", self.max_delay_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Retry(format!("{name} must be a non-negative number")));
            }
        }
        if self.max_delay_secs < self.initial_delay_secs {
            return Err(ConfigError::Retry(
                "max_delay_secs is smaller than initial_delay_secs".into(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Retry("backoff_multiplier must be at least 1".into()));
        }
        Ok(())
    }
}

/// Spacing between consecutive requests, in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSettings {
    pub min_interval_secs: f64,
    pub max_interval_secs: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            min_interval_secs: 2.0,
            max_interval_secs: 4.0,
        }
    }
}

impl RateLimitSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_interval_secs.is_finite() || self.min_interval_secs < 0.0 {
            return Err(ConfigError::RateLimit(
                "min_interval_secs must be a non-negative number".into(),
            ));
        }
        let floor = MIN_INTERVAL_FLOOR.as_secs_f64();
        if self.min_interval_secs < floor {
            warn!(
                configured = self.min_interval_secs,
                floor, "min_interval_secs is below the floor, requests will be spaced by the floor"
            );
        }
        if !self.max_interval_secs.is_finite() || self.max_interval_secs < self.min_interval_secs {
            return Err(ConfigError::RateLimit(
                "max_interval_secs is smaller than min_interval_secs".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where run artefacts are written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    pub progress_file: PathBuf,
    pub stats_file: PathBuf,
    pub database: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            progress_file: PathBuf::from("hsp_progress.json"),
            stats_file: PathBuf::from("hsp_stats.json"),
            database: PathBuf::from("hsp.sqlite"),
        }
    }
}

/// Complete collector configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorConfig {
    pub routes: Vec<Route>,
    pub date_range: DateRange,

    /// Comma-separated day types, e.g. `"WEEKDAY,WEEKEND"`.
    #[serde(default = "default_day_types")]
    pub day_types: String,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub output: OutputSettings,

    /// Records needed in a task's window before it counts as collected.
    #[serde(default = "default_min_records")]
    pub min_records: u64,

    /// Request `serviceDetails` for every RID to get actual times.
    #[serde(default)]
    pub fetch_details: bool,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Lateness thresholds in minutes passed to `serviceMetrics`.
    #[serde(default)]
    pub tolerance: Vec<String>,
}

fn default_day_types() -> String {
    "WEEKDAY,SATURDAY,SUNDAY".into()
}

fn default_timeout() -> u64 {
    120
}

fn default_min_records() -> u64 {
    1
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

impl CollectorConfig {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.routes.is_empty() {
            return Err(ConfigError::NoRoutes);
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.name.trim().is_empty() {
                return Err(ConfigError::EmptyRouteName(route.to_string()));
            }
            if !seen.insert(route.name.as_str()) {
                return Err(ConfigError::DuplicateRoute(route.name.clone()));
            }
            if route.origin == route.destination {
                return Err(ConfigError::SameStations {
                    route: route.name.clone(),
                    crs: route.origin.to_string(),
                });
            }
            if let Some(window) = route.time_window
                && !window.is_valid()
            {
                return Err(ConfigError::InvalidTimeWindow {
                    route: route.name.clone(),
                    window: window.to_string(),
                });
            }
        }

        let DateRange { from, to } = self.date_range;
        if from > to {
            return Err(ConfigError::InvalidDateRange { from, to });
        }

        self.day_types()?;
        self.retry.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }

    pub fn day_types(&self) -> Result<Vec<DayType>, ConfigError> {
        Ok(parse_day_types(&self.day_types)?)
    }

    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.routes.iter().cloned().map(Arc::new).collect()
    }

    /// The full task list for this configuration.
    pub fn tasks(&self) -> Result<Vec<Task>, ConfigError> {
        Ok(build_tasks(
            &self.routes(),
            self.date_range.from,
            self.date_range.to,
            &self.day_types()?,
        )?)
    }

    pub fn oracle(&self) -> CompletionOracle {
        CompletionOracle::new(self.min_records)
    }

    /// Credentials from the file, falling back to the environment.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        self.credentials_with(|name| std::env::var(name).ok())
    }

    fn credentials_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Credentials, ConfigError> {
        if let Some(creds) = &self.credentials {
            return Ok(creds.clone());
        }
        match (lookup(USERNAME_VAR), lookup(PASSWORD_VAR)) {
            (Some(username), Some(password)) if !username.is_empty() => Ok(Credentials {
                username,
                password,
            }),
            _ => Err(ConfigError::MissingCredentials),
        }
    }

    /// Client settings for the given credentials.
    pub fn hsp_config(&self, credentials: &Credentials) -> HspConfig {
        HspConfig::new(&credentials.username, &credentials.password)
            .with_base_url(&self.base_url)
            .with_timeout(self.request_timeout_secs)
            .with_retry(self.retry.policy())
            .with_interval(
                Duration::from_secs_f64(self.rate_limit.min_interval_secs),
                Duration::from_secs_f64(self.rate_limit.max_interval_secs),
            )
    }
}
