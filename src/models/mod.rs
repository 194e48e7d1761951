//! Data models module
//!
//! Defines core data structures:
//! - ProcessInfo: Attributes of one process at one poll instant
//! - ProcessSnapshot: Filtered process table keyed by PID
//! - ProcessEvent: Created / Terminated / Modified notifications
//! - ModificationRecord: One field-level change detected between two polls

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{EVENT_PROCESS_CREATED, EVENT_PROCESS_MODIFIED, EVENT_PROCESS_TERMINATED};


/// OS-assigned process identifier
pub type Pid = u32;

/// Attributes of a single process as captured during one poll.
///
/// Fields the platform could not provide are left at their zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Process ID, unique within one snapshot
    pub pid: Pid,
    /// Process name (executable name)
    pub name: String,
    /// Parent process ID
    pub parent_pid: Pid,
    /// Full path to the executable
    pub executable_path: PathBuf,
    /// Command line joined with single spaces
    pub command_line: String,
    /// Name of the owning user
    pub username: String,
    /// CPU usage in percent since the previous refresh
    pub cpu_percent: f64,
    /// Resident set size in bytes
    pub memory_usage_bytes: u64,
    /// Number of OS threads
    pub thread_count: u32,
    /// Number of open handles / file descriptors
    pub handle_count: u32,
    /// Current working directory
    pub working_directory: PathBuf,
    /// Process start time as Unix timestamp (seconds since epoch)
    pub create_time: u64,
    /// Reserved for memory-region inspection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_regions: Vec<MemoryRegion>,
    /// Reserved for privilege inspection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub privileges: Vec<String>,
    /// Reserved for network-connection inspection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_connections: Vec<NetworkConnection>,
}

/// Memory region of a process. Not populated yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub base_address: u64,
    pub size: u64,
    pub protection: u32,
    pub state: u32,
    pub region_type: u32,
    pub usage: String,
}

/// Network connection owned by a process. Not populated yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConnection {
    pub local_address: String,
    pub local_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    pub status: String,
    pub protocol: String,
}

/// Snapshot of the filtered process table at one poll instant
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    /// HashMap of PID -> ProcessInfo for O(1) lookups
    pub processes: HashMap<Pid, ProcessInfo>,
    /// When the enumeration finished
    pub timestamp: DateTime<Utc>,
    /// Time taken to enumerate and filter the process table
    pub scan_duration: Duration,
}

impl ProcessSnapshot {
    /// Build a snapshot from process records. Later duplicates of a PID replace earlier ones.
    pub fn from_processes<I>(processes: I) -> Self
    where
        I: IntoIterator<Item = ProcessInfo>,
    {
        Self {
            processes: processes.into_iter().map(|p| (p.pid, p)).collect(),
            timestamp: Utc::now(),
            scan_duration: Duration::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessInfo> {
        self.processes.get(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }
}

/// Field-level change categories the diff engine can detect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModificationKind {
    #[serde(rename = "CommandLineChange")]
    CommandLine,
    #[serde(rename = "ThreadCountChange")]
    ThreadCount,
    #[serde(rename = "HandleCountChange")]
    HandleCount,
    #[serde(rename = "MemoryModification")]
    Memory,
    #[serde(rename = "WorkingDirectoryChange")]
    WorkingDirectory,
}

impl ModificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModificationKind::CommandLine => "CommandLineChange",
            ModificationKind::ThreadCount => "ThreadCountChange",
            ModificationKind::HandleCount => "HandleCountChange",
            ModificationKind::Memory => "MemoryModification",
            ModificationKind::WorkingDirectory => "WorkingDirectoryChange",
        }
    }
}

impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a compared field before or after a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Count(u32),
    Bytes(u64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => write!(f, "{:?}", text),
            FieldValue::Count(count) => write!(f, "{}", count),
            FieldValue::Bytes(bytes) => write!(f, "{} bytes", bytes),
        }
    }
}

/// One field-level change on a surviving process
#[derive(Debug, Clone, PartialEq)]
pub struct ModificationRecord {
    pub pid: Pid,
    pub kind: ModificationKind,
    pub old_value: FieldValue,
    pub new_value: FieldValue,
    pub description: String,
}

/// Event published by the collector for every detected change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ProcessEvent {
    #[serde(rename = "process_created")]
    Created {
        timestamp: DateTime<Utc>,
        process: ProcessInfo,
    },
    #[serde(rename = "process_terminated")]
    Terminated {
        timestamp: DateTime<Utc>,
        process: ProcessInfo,
    },
    #[serde(rename = "process_modified")]
    Modified {
        timestamp: DateTime<Utc>,
        process: ProcessInfo,
        modification: ModificationKind,
        description: String,
    },
}

impl ProcessEvent {
    /// Build a Modified event from a record, carrying the post-change process state
    pub fn modified(timestamp: DateTime<Utc>, process: ProcessInfo, record: ModificationRecord) -> Self {
        ProcessEvent::Modified {
            timestamp,
            process,
            modification: record.kind,
            description: record.description,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ProcessEvent::Created { timestamp, .. }
            | ProcessEvent::Terminated { timestamp, .. }
            | ProcessEvent::Modified { timestamp, .. } => *timestamp,
        }
    }

    pub fn process(&self) -> &ProcessInfo {
        match self {
            ProcessEvent::Created { process, .. }
            | ProcessEvent::Terminated { process, .. }
            | ProcessEvent::Modified { process, .. } => process,
        }
    }

    pub fn pid(&self) -> Pid {
        self.process().pid
    }

    /// Event type identifier, identical to the serialized `event_type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            ProcessEvent::Created { .. } => EVENT_PROCESS_CREATED,
            ProcessEvent::Terminated { .. } => EVENT_PROCESS_TERMINATED,
            ProcessEvent::Modified { .. } => EVENT_PROCESS_MODIFIED,
        }
    }

    /// Modification kind for Modified events
    pub fn modification(&self) -> Option<ModificationKind> {
        match self {
            ProcessEvent::Modified { modification, .. } => Some(*modification),
            _ => None,
        }
    }
}
