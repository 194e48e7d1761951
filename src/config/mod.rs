//! Configuration management
//!
//! Handles TOML configuration parsing, built-in defaults, and validation.
//! Loading is an explicit startup step: a configuration either validates
//! or the monitor does not start.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_EVENT_BUFFER, DEFAULT_EVENT_LOG_PATH, DEFAULT_POLLING_INTERVAL, POLLING_INTERVAL_MAX,
    POLLING_INTERVAL_MIN,
};

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// Note: bound must match POLLING_INTERVAL_MIN in constants.rs
    #[error("Invalid polling interval: {0}. Minimum is 0.1 seconds (100ms)")]
    InvalidInterval(f64),
    /// Note: bound must match POLLING_INTERVAL_MAX in constants.rs
    #[error("Invalid polling interval: {0}. Maximum is 86400 seconds (one day)")]
    IntervalTooLarge(f64),
    #[error("Invalid memory change threshold: {0}. Must be greater than 0 and at most 1")]
    InvalidMemoryThreshold(f64),
    #[error("Invalid CPU threshold: {0}. Must be greater than 0 and at most 1")]
    InvalidCpuThreshold(f64),
    #[error("Invalid thread change threshold: {0}. Must be non-negative")]
    InvalidThreadThreshold(i64),
    #[error("Invalid handle change threshold: {0}. Must be non-negative")]
    InvalidHandleThreshold(i64),
    #[error("Invalid event buffer size: {0}. Must be at least 1")]
    InvalidEventBuffer(usize),
    #[error("Event logging is enabled but no log path is configured")]
    MissingEventLogPath,
}

/// Main monitor configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfiguration {
    pub general: GeneralSettings,
    pub detectors: DetectorSettings,
    pub filters: FilterSettings,
    pub event_log: EventLogSettings,
}

/// Core runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralSettings {
    /// Polling interval in seconds (>= 0.1)
    pub polling_interval: f64,
    /// Capacity of the bounded event channel
    pub event_buffer: usize,
    /// Report processes already running at startup as created
    pub report_existing: bool,
    /// Rendering of events on stdout
    pub output_format: OutputFormat,
}

/// Event rendering format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// Per-detector enable flags and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorSettings {
    pub monitor_command_line: bool,
    pub monitor_memory: bool,
    pub monitor_threads: bool,
    pub monitor_handles: bool,
    pub monitor_working_dir: bool,
    /// Relative memory change that triggers an event, in (0, 1]
    pub memory_change_threshold: f64,
    /// CPU usage ratio in (0, 1]. Validated, reserved for a CPU detector.
    pub cpu_threshold: f64,
    /// Absolute thread count delta that triggers an event
    pub thread_change_threshold: i64,
    /// Absolute handle count delta that triggers an event
    pub handle_change_threshold: i64,
}

/// Process name / user allow and deny lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterSettings {
    /// Glob patterns of process names never monitored
    pub excluded_processes: Vec<String>,
    /// Glob patterns of process names monitored exclusively (empty = all)
    pub included_processes: Vec<String>,
    /// User names never monitored
    pub excluded_users: Vec<String>,
}

/// Optional event log file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventLogSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            event_buffer: DEFAULT_EVENT_BUFFER,
            report_existing: true,
            output_format: OutputFormat::Human,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            monitor_command_line: true,
            monitor_memory: true,
            monitor_threads: true,
            monitor_handles: true,
            monitor_working_dir: true,
            memory_change_threshold: 0.1,
            cpu_threshold: 0.75,
            thread_change_threshold: 2,
            handle_change_threshold: 10,
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            excluded_processes: vec!["svchost.exe".to_string(), "RuntimeBroker.exe".to_string()],
            included_processes: Vec::new(),
            excluded_users: vec!["root".to_string()],
        }
    }
}

impl Default for EventLogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(DEFAULT_EVENT_LOG_PATH),
        }
    }
}

impl MonitorConfiguration {
    /// Load configuration, apply `overrides`, then validate the result.
    /// `None` selects the built-in defaults.
    pub fn load<F>(path: Option<&Path>, overrides: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(&mut Self),
    {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without validating it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Render as TOML (used by `--print-config`)
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject out-of-range values before the collector starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.general.polling_interval;
        if !interval.is_finite() || interval < POLLING_INTERVAL_MIN {
            return Err(ConfigError::InvalidInterval(interval));
        }
        if interval > POLLING_INTERVAL_MAX {
            return Err(ConfigError::IntervalTooLarge(interval));
        }

        if self.general.event_buffer == 0 {
            return Err(ConfigError::InvalidEventBuffer(self.general.event_buffer));
        }

        let memory = self.detectors.memory_change_threshold;
        if !(memory > 0.0 && memory <= 1.0) {
            return Err(ConfigError::InvalidMemoryThreshold(memory));
        }

        let cpu = self.detectors.cpu_threshold;
        if !(cpu > 0.0 && cpu <= 1.0) {
            return Err(ConfigError::InvalidCpuThreshold(cpu));
        }

        if self.detectors.thread_change_threshold < 0 {
            return Err(ConfigError::InvalidThreadThreshold(self.detectors.thread_change_threshold));
        }

        if self.detectors.handle_change_threshold < 0 {
            return Err(ConfigError::InvalidHandleThreshold(self.detectors.handle_change_threshold));
        }

        if self.event_log.enabled && self.event_log.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingEventLogPath);
        }

        Ok(())
    }

    /// Polling interval as a Duration, clamped to the accepted range
    pub fn polling_duration(&self) -> Duration {
        let seconds = self.general.polling_interval;
        if seconds.is_finite() {
            Duration::from_secs_f64(seconds.clamp(POLLING_INTERVAL_MIN, POLLING_INTERVAL_MAX))
        } else {
            Duration::from_secs_f64(DEFAULT_POLLING_INTERVAL)
        }
    }
}
