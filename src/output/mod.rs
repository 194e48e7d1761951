//! Output formatting module
//!
//! Handles:
//! - Human-readable event lines
//! - JSON-lines event output
//! - The optional event log file
//! - The consumer task draining the event channel

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::Path;

use crate::config::OutputFormat;
use crate::models::ProcessEvent;

pub mod consumer;

pub use consumer::EventConsumer;

/// Format a process event as one human-readable line
pub fn format_event_human(event: &ProcessEvent) -> String {
    let timestamp = event.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true);
    let process = event.process();

    match event {
        ProcessEvent::Created { .. } => format!(
            "[{}] [+] New process: PID={} Name={} User={}",
            timestamp, process.pid, process.name, process.username
        ),
        ProcessEvent::Terminated { .. } => format!(
            "[{}] [-] Process terminated: PID={} Name={}",
            timestamp, process.pid, process.name
        ),
        ProcessEvent::Modified { description, .. } => format!(
            "[{}] [*] Process modified: PID={} Name={} - {}",
            timestamp, process.pid, process.name, description
        ),
    }
}

/// Format a process event as a single-line JSON document
pub fn format_event_json(event: &ProcessEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Renders events to stdout (or any writer) and, optionally, an event log file
pub struct EventWriter {
    format: OutputFormat,
    out: Box<dyn Write + Send>,
    event_log: Option<LineWriter<File>>,
}

impl EventWriter {
    pub fn new(format: OutputFormat, out: Box<dyn Write + Send>) -> Self {
        Self {
            format,
            out,
            event_log: None,
        }
    }

    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(format, Box::new(std::io::stdout()))
    }

    /// Also append every rendered line to `path`
    pub fn with_event_log(mut self, path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;
        self.event_log = Some(LineWriter::new(file));
        Ok(self)
    }

    pub fn render(&self, event: &ProcessEvent) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(format_event_human(event)),
            OutputFormat::Json => format_event_json(event),
        }
    }

    pub fn write_event(&mut self, event: &ProcessEvent) -> Result<()> {
        let line = self.render(event)?;

        writeln!(self.out, "{}", line).context("Failed to write event to output")?;
        if let Some(log) = self.event_log.as_mut() {
            writeln!(log, "{}", line).context("Failed to write event to event log")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("Failed to flush output")?;
        if let Some(log) = self.event_log.as_mut() {
            log.flush().context("Failed to flush event log")?;
        }
        Ok(())
    }
}
