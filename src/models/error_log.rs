//! Structured error recording.
//!
//! Epistemic foundation:
//! - K_i: Every classified error is recorded with the context it surfaced in
//! - B_i: The sink may fail (disk full, poisoned lock) → swallowed
//! - I^B: Logging must never change the outcome of the operation being logged

use super::{ClassifiedError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error};

/// One structured log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub context: String,
    pub kind: ErrorKind,
    /// Internal diagnostic message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorRecord {
    /// Snapshot an error for logging.
    pub fn new(error: &ClassifiedError, context: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            context: context.into(),
            kind: error.kind(),
            message: error.internal_message().to_string(),
            status_code: error.status_code(),
            retryable: error.is_retryable(),
            details: error.details().cloned(),
        }
    }
}

/// Destination for error records.
pub trait ErrorLog: Send + Sync {
    fn write(&self, record: &ErrorRecord) -> io::Result<()>;
}

/// Record an error against a sink.
///
/// Never fails and never panics: a failing (or panicking) sink is noted at
/// debug level and otherwise ignored.
pub fn record(log: &dyn ErrorLog, error: &ClassifiedError, context: &str) {
    let entry = ErrorRecord::new(error, context);
    match catch_unwind(AssertUnwindSafe(|| log.write(&entry))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(context = context, error = %e, "Error log write failed"),
        Err(_) => debug!(context = context, "Error log sink panicked"),
    }
}

/// Default sink: a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorLog;

impl ErrorLog for TracingErrorLog {
    fn write(&self, record: &ErrorRecord) -> io::Result<()> {
        let details = record
            .details
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        error!(
            timestamp = %record.timestamp.to_rfc3339(),
            context = %record.context,
            kind = %record.kind,
            status_code = ?record.status_code,
            retryable = record.retryable,
            details = %details,
            "{}",
            record.message
        );
        Ok(())
    }
}

/// Append-only JSONL sink.
///
/// K_i: One record per line, flushed after each write so a crash loses at
/// most the record being written.
#[derive(Debug)]
pub struct JsonlErrorLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlErrorLog {
    /// Open (or create) the log file for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ErrorLog for JsonlErrorLog {
    fn write(&self, record: &ErrorRecord) -> io::Result<()> {
        let line = serde_json::to_string(record).map_err(io::Error::other)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::other("error log lock poisoned"))?;
        writeln!(writer, "{line}")?;
        writer.flush()
    }
}

/// In-memory sink, for tests and hosts that render their own diagnostics.
#[derive(Debug, Default)]
pub struct MemoryErrorLog {
    records: Mutex<Vec<ErrorRecord>>,
}

impl MemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorLog for MemoryErrorLog {
    fn write(&self, record: &ErrorRecord) -> io::Result<()> {
        self.records
            .lock()
            .map_err(|_| io::Error::other("error log lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}
