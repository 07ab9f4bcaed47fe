//! User-visible run log.
//!
//! Separate from `tracing`: these are the lines a person reads after a run,
//! kept in memory for the duration of the run and then prepended to the
//! project's log file, newest run first.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::Path;

use crate::error::SyncResult;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Cancelled,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Append-only buffer for one run.
#[derive(Debug, Default, Clone)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) -> &LogEntry {
        self.entries.push(LogEntry {
            level,
            message: message.into(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Renders one section of the log file.
    pub fn render(&self, generated_at: DateTime<Local>) -> String {
        let mut section = format!("Log generated at: {}\n", generated_at.format(TIMESTAMP_FORMAT));
        for entry in &self.entries {
            section.push('\n');
            section.push_str(&entry.message);
        }
        section.push('\n');
        section
    }

    /// Writes this run's section above whatever `path` already holds.
    ///
    /// Read-then-write, not atomic: a crash in between can lose the old log.
    pub async fn persist(&self, path: &Path, generated_at: DateTime<Local>) -> SyncResult<()> {
        let mut content = self.render(generated_at);
        match tokio::fs::read_to_string(path).await {
            Ok(previous) => {
                content.push_str("\n\n");
                content.push_str(&previous);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
