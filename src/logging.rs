//! Request-scoped file logging.
//!
//! `tracing` covers process-level logs on stderr; this JSONL file log is
//! the per-request audit trail (who called what, which model, how the
//! backend answered). Entries are appended to disk and kept in a small
//! in-memory ring for inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_RING_ENTRIES: usize = 5_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            message: message.into(),
        }
    }
}

struct Inner {
    entries: VecDeque<LogEntry>,
    writer: BufWriter<File>,
}

/// Cheaply cloneable handle to the JSONL request log.
#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<Inner>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self(Arc::new(Mutex::new(Inner {
            entries: VecDeque::with_capacity(MAX_RING_ENTRIES),
            writer: BufWriter::new(file),
        }))))
    }

    pub fn log(&self, entry: LogEntry) {
        if let Ok(mut inner) = self.0.lock() {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(inner.writer, "{json}");
                let _ = inner.writer.flush();
            }
            if inner.entries.len() >= MAX_RING_ENTRIES {
                inner.entries.pop_front();
            }
            inner.entries.push_back(entry);
        }
    }

    pub fn debug(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Debug, component, message));
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, component, message));
    }

    pub fn warn(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warn, component, message));
    }

    pub fn error(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, component, message));
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.0
            .lock()
            .map(|inner| inner.entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}
