//! Process filtering
//!
//! The single predicate deciding whether a process is monitored. Snapshot
//! construction is the only caller, so every snapshot is filter-closed and
//! downstream stages never re-filter.
//!
//! Process names are matched against shell-style glob patterns ('*', '?',
//! '[...]') case-insensitively. Wildcards never match '/'. Malformed patterns
//! never match.

use glob::{MatchOptions, Pattern};
use log::warn;

use crate::config::FilterSettings;
use crate::models::ProcessInfo;

const NAME_MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled allow/deny lists
#[derive(Debug, Clone)]
pub struct ProcessFilter {
    excluded_processes: Vec<Pattern>,
    included_processes: Vec<Pattern>,
    /// True when an include list was configured, even if none of its patterns compiled
    include_list_active: bool,
    /// Lowercased user names
    excluded_users: Vec<String>,
}

impl ProcessFilter {
    pub fn new(settings: &FilterSettings) -> Self {
        Self {
            excluded_processes: compile_patterns(&settings.excluded_processes),
            included_processes: compile_patterns(&settings.included_processes),
            include_list_active: !settings.included_processes.is_empty(),
            excluded_users: settings
                .excluded_users
                .iter()
                .map(|user| user.to_lowercase())
                .collect(),
        }
    }

    /// Filter that accepts every process
    pub fn allow_all() -> Self {
        Self::new(&FilterSettings {
            excluded_processes: Vec::new(),
            included_processes: Vec::new(),
            excluded_users: Vec::new(),
        })
    }

    /// Decide whether a process should be monitored
    pub fn should_monitor(&self, info: &ProcessInfo) -> bool {
        if matches_any(&self.excluded_processes, &info.name) {
            return false;
        }

        if self.include_list_active && !matches_any(&self.included_processes, &info.name) {
            return false;
        }

        let username = info.username.to_lowercase();
        !self.excluded_users.iter().any(|user| *user == username)
    }
}

fn matches_any(patterns: &[Pattern], name: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| pattern.matches_with(name, NAME_MATCH_OPTIONS))
}

fn compile_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!("Ignoring malformed process name pattern '{}': {}", raw, e);
                None
            }
        })
        .collect()
}
