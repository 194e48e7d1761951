//! Global constants for procsentinel
//!
//! Centralized location for application-wide constants

/// Application name used for the CLI and log payloads
pub const APP_NAME: &str = "procsentinel";

/// Version string embedded at build time
pub const APP_VERSION: &str = env!("PROCSENTINEL_VERSION");

/// Short commit hash embedded at build time
pub const GIT_HASH: &str = env!("PROCSENTINEL_GIT_HASH");

/// Shortest accepted polling interval in seconds
pub const POLLING_INTERVAL_MIN: f64 = 0.1;

/// Longest accepted polling interval in seconds (one day)
pub const POLLING_INTERVAL_MAX: f64 = 86_400.0;

/// Default polling interval in seconds
pub const DEFAULT_POLLING_INTERVAL: f64 = 1.0;

/// Default capacity of the collector -> consumer event channel
pub const DEFAULT_EVENT_BUFFER: usize = 1000;

/// Default path of the event log file
pub const DEFAULT_EVENT_LOG_PATH: &str = "process_monitor.log";

/// Event type identifiers used in structured output
pub const EVENT_PROCESS_CREATED: &str = "process_created";
pub const EVENT_PROCESS_TERMINATED: &str = "process_terminated";
pub const EVENT_PROCESS_MODIFIED: &str = "process_modified";
