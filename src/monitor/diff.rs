//! Snapshot diffing
//!
//! Classifies every PID seen in two snapshots as created, terminated, or
//! surviving, and runs the field comparisons on survivors. Both snapshots
//! are expected to be filter-closed already.

use chrono::{DateTime, Utc};

use crate::config::DetectorSettings;
use crate::models::{FieldValue, ModificationKind, ModificationRecord, ProcessEvent, ProcessInfo, ProcessSnapshot};

/// Enable flags and thresholds for the field comparisons
#[derive(Debug, Clone, PartialEq)]
pub struct DiffSettings {
    pub monitor_command_line: bool,
    pub monitor_threads: bool,
    pub thread_change_threshold: u64,
    pub monitor_handles: bool,
    pub handle_change_threshold: u64,
    pub monitor_memory: bool,
    pub memory_change_threshold: f64,
    pub monitor_working_dir: bool,
}

impl From<&DetectorSettings> for DiffSettings {
    fn from(detectors: &DetectorSettings) -> Self {
        DiffSettings {
            monitor_command_line: detectors.monitor_command_line,
            monitor_threads: detectors.monitor_threads,
            thread_change_threshold: u64::try_from(detectors.thread_change_threshold).unwrap_or(0),
            monitor_handles: detectors.monitor_handles,
            handle_change_threshold: u64::try_from(detectors.handle_change_threshold).unwrap_or(0),
            monitor_memory: detectors.monitor_memory,
            memory_change_threshold: detectors.memory_change_threshold,
            monitor_working_dir: detectors.monitor_working_dir,
        }
    }
}

impl Default for DiffSettings {
    fn default() -> Self {
        DiffSettings::from(&DetectorSettings::default())
    }
}

/// Result of comparing two snapshots. Lists are ordered by PID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotDiff {
    pub created: Vec<ProcessInfo>,
    pub terminated: Vec<ProcessInfo>,
    /// Surviving processes (post-change state) with at least one modification
    pub modified: Vec<(ProcessInfo, Vec<ModificationRecord>)>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.terminated.is_empty() && self.modified.is_empty()
    }

    /// Number of events this diff translates into
    pub fn event_count(&self) -> usize {
        self.created.len()
            + self.terminated.len()
            + self.modified.iter().map(|(_, records)| records.len()).sum::<usize>()
    }

    /// One event per created process, per terminated process, and per
    /// modification record, all sharing the detection timestamp
    pub fn into_events(self, timestamp: DateTime<Utc>) -> Vec<ProcessEvent> {
        let mut events = Vec::with_capacity(self.event_count());

        events.extend(
            self.created
                .into_iter()
                .map(|process| ProcessEvent::Created { timestamp, process }),
        );
        events.extend(
            self.terminated
                .into_iter()
                .map(|process| ProcessEvent::Terminated { timestamp, process }),
        );
        for (process, records) in self.modified {
            for record in records {
                events.push(ProcessEvent::modified(timestamp, process.clone(), record));
            }
        }

        events
    }
}

/// Compares snapshots using the configured detectors
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    settings: DiffSettings,
}

impl DiffEngine {
    pub fn new(settings: DiffSettings) -> Self {
        Self { settings }
    }

    /// Classify every PID of `previous` and `current`
    pub fn diff(&self, previous: &ProcessSnapshot, current: &ProcessSnapshot) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();

        for (pid, new_info) in &current.processes {
            match previous.processes.get(pid) {
                None => diff.created.push(new_info.clone()),
                Some(old_info) => {
                    let records = self.detect_modifications(old_info, new_info);
                    if !records.is_empty() {
                        diff.modified.push((new_info.clone(), records));
                    }
                }
            }
        }

        diff.terminated = previous
            .processes
            .iter()
            .filter(|(pid, _)| !current.processes.contains_key(pid))
            .map(|(_, info)| info.clone())
            .collect();

        diff.created.sort_by_key(|p| p.pid);
        diff.terminated.sort_by_key(|p| p.pid);
        diff.modified.sort_by_key(|(p, _)| p.pid);
        diff
    }

    /// Field comparisons between two observations of the same PID
    pub fn detect_modifications(&self, old: &ProcessInfo, new: &ProcessInfo) -> Vec<ModificationRecord> {
        let settings = &self.settings;
        let mut modifications = Vec::new();

        if settings.monitor_command_line && old.command_line != new.command_line {
            modifications.push(ModificationRecord {
                pid: new.pid,
                kind: ModificationKind::CommandLine,
                old_value: FieldValue::Text(old.command_line.clone()),
                new_value: FieldValue::Text(new.command_line.clone()),
                description: format!(
                    "Command line modified: {:?} -> {:?}",
                    old.command_line, new.command_line
                ),
            });
        }

        if settings.monitor_threads {
            if let Some(delta) = count_delta(old.thread_count, new.thread_count, settings.thread_change_threshold) {
                modifications.push(ModificationRecord {
                    pid: new.pid,
                    kind: ModificationKind::ThreadCount,
                    old_value: FieldValue::Count(old.thread_count),
                    new_value: FieldValue::Count(new.thread_count),
                    description: format!(
                        "Thread count changed by {:+} ({} -> {})",
                        delta, old.thread_count, new.thread_count
                    ),
                });
            }
        }

        if settings.monitor_handles {
            if let Some(delta) = count_delta(old.handle_count, new.handle_count, settings.handle_change_threshold) {
                modifications.push(ModificationRecord {
                    pid: new.pid,
                    kind: ModificationKind::HandleCount,
                    old_value: FieldValue::Count(old.handle_count),
                    new_value: FieldValue::Count(new.handle_count),
                    description: format!(
                        "Handle count changed by {:+} ({} -> {})",
                        delta, old.handle_count, new.handle_count
                    ),
                });
            }
        }

        if settings.monitor_memory
            && memory_changed(old.memory_usage_bytes, new.memory_usage_bytes, settings.memory_change_threshold)
        {
            modifications.push(ModificationRecord {
                pid: new.pid,
                kind: ModificationKind::Memory,
                old_value: FieldValue::Bytes(old.memory_usage_bytes),
                new_value: FieldValue::Bytes(new.memory_usage_bytes),
                description: describe_memory_change(old.memory_usage_bytes, new.memory_usage_bytes),
            });
        }

        if settings.monitor_working_dir && old.working_directory != new.working_directory {
            modifications.push(ModificationRecord {
                pid: new.pid,
                kind: ModificationKind::WorkingDirectory,
                old_value: FieldValue::Text(old.working_directory.display().to_string()),
                new_value: FieldValue::Text(new.working_directory.display().to_string()),
                description: format!(
                    "Working directory changed: {} -> {}",
                    old.working_directory.display(),
                    new.working_directory.display()
                ),
            });
        }

        modifications
    }
}

/// Signed delta when `|new - old| >= threshold`. A zero delta never counts.
fn count_delta(old: u32, new: u32, threshold: u64) -> Option<i64> {
    let delta = i64::from(new) - i64::from(old);
    let magnitude = delta.unsigned_abs();
    (magnitude > 0 && magnitude >= threshold).then_some(delta)
}

/// True when `new / old` leaves `[1 - threshold, 1 + threshold]`.
/// Growth from zero is an unbounded change.
fn memory_changed(old: u64, new: u64, threshold: f64) -> bool {
    if old == 0 {
        return new > 0;
    }
    let ratio = new as f64 / old as f64;
    ratio < 1.0 - threshold || ratio > 1.0 + threshold
}

fn describe_memory_change(old: u64, new: u64) -> String {
    if old == 0 {
        return format!("Significant memory usage change: 0 -> {} bytes", new);
    }
    let percent = (new as f64 - old as f64) / old as f64 * 100.0;
    format!(
        "Significant memory usage change: {} -> {} bytes ({:+.1}%)",
        old, new, percent
    )
}
