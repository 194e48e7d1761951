//! Shared helpers for integration tests
//!
//! Provides a scripted process source and an inspectable output buffer so
//! the full collector -> channel -> consumer pipeline can run without
//! touching the real process table.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};

use procsentinel::models::{Pid, ProcessInfo};
use procsentinel::monitor::{ProcessSource, SourceError};

/// Replays process tables in order; the last table repeats forever
pub struct ScriptedSource {
    frames: VecDeque<Result<Vec<ProcessInfo>, SourceError>>,
    current: HashMap<Pid, ProcessInfo>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Result<Vec<ProcessInfo>, SourceError>>) -> Self {
        Self {
            frames: frames.into(),
            current: HashMap::new(),
        }
    }
}

impl ProcessSource for ScriptedSource {
    fn enumerate(&mut self) -> Result<Vec<Pid>, SourceError> {
        let frame = if self.frames.len() > 1 {
            self.frames.pop_front()
        } else {
            self.frames.front().cloned()
        };
        let processes = frame.unwrap_or_else(|| Ok(Vec::new()))?;
        self.current = processes.into_iter().map(|p| (p.pid, p)).collect();
        Ok(self.current.keys().copied().collect())
    }

    fn attributes(&mut self, pid: Pid) -> Result<ProcessInfo, SourceError> {
        self.current.get(&pid).cloned().ok_or(SourceError::NotFound(pid))
    }
}

/// Build a process record with sensible non-zero attributes
pub fn process(pid: Pid, name: &str) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        parent_pid: 1,
        command_line: format!("/usr/bin/{}", name),
        username: "alice".to_string(),
        memory_usage_bytes: 8 * 1024 * 1024,
        thread_count: 4,
        handle_count: 16,
        ..Default::default()
    }
}

/// Writer whose contents stay inspectable after being boxed
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(String::from).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
