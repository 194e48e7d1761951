//! Diagnostic logging
//!
//! Routes the `log` facade to stderr through env_logger and provides
//! structured lifecycle records (message plus JSON payload).

use anyhow::{anyhow, Result};
use log::{error, info, warn, LevelFilter};
use serde_json::json;
use std::path::Path;

use crate::config::MonitorConfiguration;
use crate::constants::{APP_NAME, APP_VERSION, GIT_HASH};
use crate::monitor::CollectorSummary;

/// Initialize the global logger. `RUST_LOG` takes precedence over `debug`.
pub fn init_logger(debug: bool) -> Result<()> {
    let default_level = if debug { LevelFilter::Debug } else { LevelFilter::Info };

    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_env("RUST_LOG")
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| anyhow!("Failed to set logger: {}", e))
}

/// Log monitor startup with the effective configuration
pub fn log_startup(config_path: Option<&Path>, config: &MonitorConfiguration) {
    let source = config_path
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());

    let payload = json!({
        "event": "monitor_startup",
        "app": APP_NAME,
        "version": APP_VERSION,
        "commit": GIT_HASH,
        "pid": std::process::id(),
        "config_source": source,
        "polling_interval": config.general.polling_interval,
        "event_buffer": config.general.event_buffer,
        "detectors": {
            "command_line": config.detectors.monitor_command_line,
            "memory": config.detectors.monitor_memory,
            "threads": config.detectors.monitor_threads,
            "handles": config.detectors.monitor_handles,
            "working_dir": config.detectors.monitor_working_dir,
        },
        "filters": {
            "excluded_processes": config.filters.excluded_processes,
            "included_processes": config.filters.included_processes,
            "excluded_users": config.filters.excluded_users,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    info!("Process monitor started | {}", payload);
}

/// Log monitor shutdown with the collector's summary
pub fn log_shutdown(reason: &str, summary: Option<&CollectorSummary>) {
    let payload = json!({
        "event": "monitor_shutdown",
        "reason": reason,
        "ticks": summary.map(|s| s.ticks),
        "failed_ticks": summary.map(|s| s.failed_ticks),
        "events_published": summary.map(|s| s.events_published),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    info!("Process monitor stopped | {}", payload);
}

/// Log a tick aborted by a source failure
pub fn log_tick_failure(message: &str) {
    let payload = json!({
        "event": "tick_aborted",
        "message": message,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    warn!("Process enumeration failed, retrying next tick | {}", payload);
}

/// Log a task that ended with an error
pub fn log_task_error(task: &str, message: &str) {
    let payload = json!({
        "event": "error",
        "task": task,
        "message": message,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    error!("{} failed | {}", task, payload);
}
