//! Structured processing log.
//!
//! Each run appends entries in order; the log is rendered to text only when
//! the sound record is persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// A step completed
    Info,
    /// An expected, tool-reported failure
    Failure,
    /// A fault no stage anticipated
    Unhandled,
}

/// One line (plus optional detail) of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: LogKind::Info,
            message: message.into(),
            detail: None,
        }
    }

    pub fn failure(message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: LogKind::Failure,
            message: message.into(),
            detail,
        }
    }

    pub fn unhandled(message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: LogKind::Unhandled,
            message: message.into(),
            detail,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.kind, LogKind::Failure | LogKind::Unhandled)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LogKind::Info => writeln!(f, "{}", self.message)?,
            LogKind::Failure => writeln!(f, "failed:{}", self.message)?,
            LogKind::Unhandled => writeln!(f, "failed:unhandled exception {}", self.message)?,
        }
        if let Some(detail) = &self.detail {
            writeln!(f, "{}", detail)?;
        }
        Ok(())
    }
}

/// Ordered, append-only log of one processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingLog {
    entries: Vec<LogEntry>,
}

impl ProcessingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogEntry::info(message));
    }

    pub fn failure(&mut self, message: impl Into<String>, detail: Option<String>) {
        self.push(LogEntry::failure(message, detail));
    }

    pub fn unhandled(&mut self, message: impl Into<String>, detail: Option<String>) {
        self.push(LogEntry::unhandled(message, detail));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render to the persisted text form.
    pub fn render(&self) -> String {
        self.entries.iter().map(|e| e.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_mixed_entries() {
        let mut log = ProcessingLog::new();
        log.info("converted to pcm: /tmp/42.wav");
        log.failure("conversion to mp3 (preview) has failed", Some("exit code 1".into()));
        log.unhandled("during stereo normalisation", None);

        assert_eq!(
            log.render(),
            "converted to pcm: /tmp/42.wav\n\
             failed:conversion to mp3 (preview) has failed\n\
             exit code 1\n\
             failed:unhandled exception during stereo normalisation\n"
        );
    }

    #[test]
    fn test_empty_log_renders_empty() {
        let log = ProcessingLog::new();
        assert!(log.is_empty());
        assert_eq!(log.render(), "");
    }

    #[test]
    fn test_failure_classification() {
        assert!(!LogEntry::info("ok").is_failure());
        assert!(LogEntry::failure("x", None).is_failure());
        assert!(LogEntry::unhandled("y", None).is_failure());
    }
}
