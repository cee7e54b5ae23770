//! `ap_config` - Configuration parsing and validation for autoprotect
//!
//! This crate provides:
//! - TOML configuration parsing
//! - Legacy `export KEY=value` rc file parsing
//! - Default value handling
//! - Environment variable overrides
//! - Path expansion (`~/` to home directory)
//! - Auto-discovery from standard config paths
//!
//! A config is validated once at construction and then shared by reference;
//! nothing downstream re-parses raw strings.

use chrono::{NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Format accepted for the schedule time-of-day (24-hour clock)
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// Placeholder used when displaying secrets
pub const MASKED: &str = "********";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to render TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ApConfig {
    /// Global settings
    pub global: GlobalConfig,

    /// Cloud endpoint and admin credentials
    pub cloud: CloudConfig,

    /// Backup operator identity
    pub operator: OperatorConfig,

    /// Backup job schedule
    pub schedule: ScheduleConfig,

    /// Sweep behaviour
    pub sweep: SweepConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logs: bool,

    /// Optional log file, written in addition to stderr
    pub log_file: Option<PathBuf>,

    /// Interval between sweeps in daemon mode
    pub poll_interval_secs: u64,

    /// Timeout applied to every external command
    pub command_timeout_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            log_file: None,
            poll_interval_secs: 86_400,
            command_timeout_secs: 120,
        }
    }
}

/// Expand tilde in path to home directory
#[must_use]
pub fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if let Some(stripped) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if path_str == "~" && let Some(home) = dirs::home_dir() {
        return home;
    }
    path.to_path_buf()
}

/// Cloud endpoint and the admin identity used for discovery calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CloudConfig {
    /// Identity service URL
    pub auth_url: String,

    /// Endpoint interface (public, internal, admin)
    pub interface: String,

    /// Identity API version
    pub identity_api_version: String,

    /// Region name
    pub region_name: String,

    /// Admin username
    pub username: String,

    /// Admin password
    pub password: String,

    /// Admin domain id
    pub domain_id: String,

    /// Admin project id
    pub project_id: String,

    /// Path or name of the `openstack` binary
    pub openstack_bin: PathBuf,

    /// Path or name of the `workloadmgr` binary
    pub workloadmgr_bin: PathBuf,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            auth_url: String::new(),
            interface: "public".to_string(),
            identity_api_version: "3".to_string(),
            region_name: String::new(),
            username: String::new(),
            password: String::new(),
            domain_id: String::new(),
            project_id: String::new(),
            openstack_bin: PathBuf::from("openstack"),
            workloadmgr_bin: PathBuf::from("workloadmgr"),
        }
    }
}

/// Backup operator account, looked up by name in every domain
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct OperatorConfig {
    /// Operator display name (case-sensitive exact match)
    pub name: String,

    /// Operator password, used to submit enrollments
    pub password: String,
}

/// Relative schedule for newly created backup jobs
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Days from now until the first run (may be zero or negative)
    pub start_offset_days: i64,

    /// Time of day of the first run, `HH:MM:SS`
    pub start_time: String,

    /// Interval between runs, passed through verbatim (e.g. `24hrs`)
    pub interval: String,

    /// Number of snapshots to retain
    pub retention: u32,
}

impl ScheduleConfig {
    /// Parse the configured time-of-day.
    ///
    /// # Errors
    /// Returns [`ConfigError::ValidationError`] if `start_time` is not a 24-hour `HH:MM:SS` time.
    pub fn time_of_day(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.start_time, TIME_OF_DAY_FORMAT).map_err(|e| {
            ConfigError::ValidationError(format!(
                "schedule.start_time '{}' is not HH:MM:SS: {e}",
                self.start_time
            ))
        })
    }
}

/// Sweep behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    /// Instances younger than this many days are left alone
    pub min_age_days: u32,

    /// Instance property that marks an instance as already enrolled
    pub marker_key: String,

    /// Report what would be enrolled without submitting anything
    pub dry_run: bool,

    /// Restrict the sweep to these domain ids or names (empty = all)
    pub domains: Vec<String>,

    /// Lease file guarding against overlapping sweeps on this host
    pub lease_path: Option<PathBuf>,

    /// Lease lifetime in seconds
    pub lease_ttl_secs: u64,

    /// Description attached to every created backup job
    pub description: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            min_age_days: 0,
            marker_key: "workload_id".to_string(),
            dry_run: false,
            domains: vec![],
            lease_path: None,
            lease_ttl_secs: 21_600,
            description: "created-by-autoprotect-script".to_string(),
        }
    }
}

impl SweepConfig {
    /// Whether a domain passes the configured allow-list
    #[must_use]
    pub fn allows_domain(&self, id: &str, name: &str) -> bool {
        self.domains.is_empty() || self.domains.iter().any(|d| d == id || d == name)
    }
}

impl ApConfig {
    /// Standard config file paths, in order of precedence
    #[must_use]
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("autoprotect.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("autoprotect").join("autoprotect.toml"));
        }

        paths.push(PathBuf::from("/etc/autoprotect/autoprotect.toml"));

        paths
    }

    /// Discover and load configuration from standard paths, applying env overrides.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if no config is found or the discovered one is invalid.
    pub fn discover_with_env() -> Result<Self, ConfigError> {
        for path in Self::config_paths() {
            if path.exists() {
                info!(path = %path.display(), "Loading config from");
                return Self::load_with_env(&path);
            }
        }

        Err(ConfigError::MissingField(format!(
            "no config file found in {}",
            Self::config_paths()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Load configuration from a specific TOML file.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load a TOML file and apply environment variable overrides before validating.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or validated.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ApConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.finish()
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the document cannot be parsed or validated.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ApConfig = toml::from_str(content)?;
        config.finish()
    }

    /// Load a legacy rc file made of `export KEY=value` lines.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read or the result is invalid.
    pub fn from_rc_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_rc_str(&content)?;
        config.apply_env_overrides();
        config.finish()
    }

    /// Map the variables of an rc document onto a config without validating it.
    ///
    /// Lines that are not `export KEY=value` are ignored, as are unknown keys.
    ///
    /// # Errors
    /// Returns [`ConfigError::ValidationError`] when a numeric value does not parse.
    pub fn from_rc_str(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in content.lines() {
            let Some((key, value)) = parse_export_line(line) else {
                continue;
            };

            match key {
                "OS_AUTH_URL" => config.cloud.auth_url = value,
                "OS_PROJECT_ID" => config.cloud.project_id = value,
                "OS_TENANT_ID" => {
                    if config.cloud.project_id.is_empty() {
                        config.cloud.project_id = value;
                    }
                }
                "OS_USERNAME" => config.cloud.username = value,
                "OS_PASSWORD" => config.cloud.password = value,
                "OS_DOMAIN_ID" => config.cloud.domain_id = value,
                "OS_REGION_NAME" => config.cloud.region_name = value,
                "OS_INTERFACE" => config.cloud.interface = value,
                "OS_IDENTITY_API_VERSION" => config.cloud.identity_api_version = value,
                "OS_BACKUP_ADMIN" => config.operator.name = value,
                "OS_BACKUP_ADMIN_PASSWORD" => config.operator.password = value,
                "JOB_INTERVAL" => config.schedule.interval = value,
                "SNAPS_TO_RETAIN" => config.schedule.retention = parse_number(key, &value)?,
                "START_DATE" => config.schedule.start_offset_days = parse_number(key, &value)?,
                "START_TIME" => config.schedule.start_time = value,
                "log_file" => config.global.log_file = Some(PathBuf::from(value)),
                "vm_age" => config.sweep.min_age_days = parse_number(key, &value)?,
                other => debug!(key = other, "Ignoring rc variable"),
            }
        }

        Ok(config)
    }

    fn finish(mut self) -> Result<Self, ConfigError> {
        self.expand_all_paths();
        self.validate()?;
        Ok(self)
    }

    /// Expand all paths in configuration (resolve `~/` to home directory)
    pub fn expand_all_paths(&mut self) {
        if let Some(ref mut log_file) = self.global.log_file {
            *log_file = expand_path(log_file);
        }
        if let Some(ref mut lease_path) = self.sweep.lease_path {
            *lease_path = expand_path(lease_path);
        }
        self.cloud.openstack_bin = expand_path(&self.cloud.openstack_bin);
        self.cloud.workloadmgr_bin = expand_path(&self.cloud.workloadmgr_bin);
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AP_LOG_LEVEL") {
            self.global.log_level = val;
        }
        if let Ok(val) = std::env::var("AP_DRY_RUN") {
            self.sweep.dry_run = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(val) = std::env::var("AP_MIN_AGE_DAYS")
            && let Ok(days) = val.parse()
        {
            self.sweep.min_age_days = days;
        }
        if let Ok(val) = std::env::var("AP_OPERATOR_PASSWORD") {
            self.operator.password = val;
        }
        if let Ok(val) = std::env::var("OS_PASSWORD") {
            self.cloud.password = val;
        }
    }

    /// Validate configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when a required field is empty or a value is malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("cloud.auth_url", &self.cloud.auth_url),
            ("cloud.username", &self.cloud.username),
            ("cloud.password", &self.cloud.password),
            ("cloud.domain_id", &self.cloud.domain_id),
            ("cloud.project_id", &self.cloud.project_id),
            ("cloud.region_name", &self.cloud.region_name),
            ("operator.name", &self.operator.name),
            ("operator.password", &self.operator.password),
            ("schedule.start_time", &self.schedule.start_time),
            ("schedule.interval", &self.schedule.interval),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field.to_string()));
            }
        }

        self.schedule.time_of_day()?;

        if self.schedule.retention == 0 {
            return Err(ConfigError::ValidationError(
                "schedule.retention must be > 0".to_string(),
            ));
        }

        if self.sweep.marker_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sweep.marker_key must not be empty".to_string(),
            ));
        }

        if self.global.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "command_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.global.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_secs must be > 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.global.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.global.log_level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Copy of this config with every secret masked, for display
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.cloud.password.is_empty() {
            copy.cloud.password = MASKED.to_string();
        }
        if !copy.operator.password.is_empty() {
            copy.operator.password = MASKED.to_string();
        }
        copy
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Returns [`ConfigError::SerializeError`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get daemon poll interval as Duration
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.global.poll_interval_secs)
    }

    /// Get external command timeout as Duration
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.global.command_timeout_secs)
    }

    /// Minimum instance age before enrollment
    #[must_use]
    pub fn min_age(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.sweep.min_age_days))
    }

    /// Lease lifetime
    #[must_use]
    pub fn lease_ttl(&self) -> TimeDelta {
        TimeDelta::seconds(i64::try_from(self.sweep.lease_ttl_secs).unwrap_or(i64::MAX))
    }
}

/// Split an `export KEY=value` line, stripping surrounding quotes from the value
fn parse_export_line(line: &str) -> Option<(&str, String)> {
    let rest = line.trim().strip_prefix("export")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (key, value) = rest.trim().split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches('"').trim_matches('\'');
    Some((key, value.to_string()))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("{key}='{value}' is not a number: {e}")))
}
