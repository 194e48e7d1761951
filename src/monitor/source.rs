//! Process table access
//!
//! `ProcessSource` is the narrow interface the collector polls. The
//! production implementation is backed by sysinfo; tests substitute
//! scripted in-memory sources.

use std::path::Path;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, ThreadKind, Users};

use crate::models::{Pid, ProcessInfo};

/// Errors raised by a process source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// The whole process table could not be read; the tick is aborted
    #[error("Failed to enumerate processes: {0}")]
    Enumeration(String),
    /// The source itself is unusable for this tick
    #[error("Process source unavailable: {0}")]
    Unavailable(String),
    /// The process exited between enumeration and attribute retrieval
    #[error("Process {0} not found")]
    NotFound(Pid),
    /// Attributes of one process could not be read
    #[error("Failed to read process {pid}: {message}")]
    Access { pid: Pid, message: String },
}

impl SourceError {
    /// Per-process failures skip one record; everything else aborts the tick
    pub fn is_per_process(&self) -> bool {
        matches!(self, SourceError::NotFound(_) | SourceError::Access { .. })
    }
}

/// Live process table
pub trait ProcessSource: Send {
    /// Refresh the table and list the PIDs currently present, in any order
    fn enumerate(&mut self) -> Result<Vec<Pid>, SourceError>;

    /// Attributes of one PID from the most recent enumeration.
    ///
    /// Fields that cannot be read are left at their zero value.
    fn attributes(&mut self, pid: Pid) -> Result<ProcessInfo, SourceError>;
}

/// Cross-platform process source using the sysinfo crate
pub struct SysinfoSource {
    system: System,
    users: Users,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            users: Users::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoSource {
    fn enumerate(&mut self) -> Result<Vec<Pid>, SourceError> {
        // The System is kept across ticks so CPU usage is measured between polls
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
        self.users = Users::new_with_refreshed_list();

        // Linux lists userland threads next to processes under their TID.
        // Kernel threads stay, they are real process table entries.
        Ok(self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| !matches!(process.thread_kind(), Some(ThreadKind::Userland)))
            .map(|(pid, _)| pid.as_u32())
            .collect())
    }

    fn attributes(&mut self, pid: Pid) -> Result<ProcessInfo, SourceError> {
        let process = self
            .system
            .process(sysinfo::Pid::from_u32(pid))
            .ok_or(SourceError::NotFound(pid))?;

        let command_line = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        let username = process
            .user_id()
            .and_then(|uid| self.users.get_user_by_id(uid))
            .map(|user| user.name().to_string())
            .unwrap_or_default();

        let thread_count = process
            .tasks()
            .map(|tasks| u32::try_from(tasks.len()).unwrap_or(u32::MAX))
            .unwrap_or(0);

        Ok(ProcessInfo {
            pid,
            name: process.name().to_string_lossy().into_owned(),
            parent_pid: process.parent().map(|ppid| ppid.as_u32()).unwrap_or(0),
            executable_path: process.exe().map(Path::to_path_buf).unwrap_or_default(),
            command_line,
            username,
            cpu_percent: f64::from(process.cpu_usage()),
            memory_usage_bytes: process.memory(),
            thread_count,
            handle_count: count_open_handles(pid),
            working_directory: process.cwd().map(Path::to_path_buf).unwrap_or_default(),
            create_time: process.start_time(),
            ..Default::default()
        })
    }
}

/// Number of open file descriptors, 0 when unreadable
#[cfg(target_os = "linux")]
fn count_open_handles(pid: Pid) -> u32 {
    std::fs::read_dir(format!("/proc/{}/fd", pid))
        .map(|entries| u32::try_from(entries.count()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn count_open_handles(_pid: Pid) -> u32 {
    0
}
