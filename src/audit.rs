//! # Audit Logging
//!
//! Structured records of every action-lifecycle transition, written as
//! JSONL for offline inspection. Each entry carries a timestamp, the
//! operation that occurred, and context metadata.
//!
//! The engine audits through the [`AuditSink`] trait; the daemon installs
//! a [`DurableAuditLog`] while tests use [`RecordingAuditLog`].

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single audited operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier for this entry.
    pub id: String,
    /// When the operation occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub operation: AuditOperation,
}

/// The lifecycle transitions worth recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditOperation {
    /// An action was mounted onto an interaction's stack.
    ActionMounted {
        /// The action name.
        name: String,
        /// The mount context as submitted.
        context: Value,
    },
    /// A mount attempt was abandoned (not resolvable, disabled, denied).
    MountAbandoned {
        /// The action name.
        name: String,
        /// Why the mount was abandoned.
        reason: String,
    },
    /// An action call completed.
    ActionCalled {
        /// The action name.
        name: String,
        /// The terminal status ("success", "failure", "halted", and so on).
        status: String,
        /// Whether the transaction committed.
        committed: bool,
    },
    /// An action call was refused by the rate limiter.
    ActionRateLimited {
        /// The action name.
        name: String,
        /// Seconds until the limiter admits another attempt.
        retry_after_secs: u64,
    },
    /// An action (or several) left the stack.
    ActionUnmounted {
        /// The action names popped, deepest first.
        popped: Vec<String>,
    },
}

impl AuditEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(operation: AuditOperation) -> Self {
        AuditEntry {
            id: Self::generate_id(),
            timestamp: Utc::now(),
            operation,
        }
    }

    fn generate_id() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("audit_{}", timestamp)
    }

    /// The operation type as a string for filtering.
    pub fn operation_type(&self) -> &'static str {
        match &self.operation {
            AuditOperation::ActionMounted { .. } => "ActionMounted",
            AuditOperation::MountAbandoned { .. } => "MountAbandoned",
            AuditOperation::ActionCalled { .. } => "ActionCalled",
            AuditOperation::ActionRateLimited { .. } => "ActionRateLimited",
            AuditOperation::ActionUnmounted { .. } => "ActionUnmounted",
        }
    }
}

/// Where audit entries go.
pub trait AuditSink: Send + Sync {
    /// Records an entry. Sinks must not fail the caller; IO errors are
    /// reported out-of-band.
    fn record(&self, entry: AuditEntry);
}

/// An audit sink that appends JSONL to a file.
pub struct DurableAuditLog {
    path: PathBuf,
}

impl DurableAuditLog {
    /// Creates a log writing to the given path.
    pub fn new(path: PathBuf) -> Self {
        DurableAuditLog { path }
    }

    /// Creates a log writing to `formwork.jsonl` in the working directory.
    pub fn with_default_path() -> Self {
        Self::new(PathBuf::from("formwork.jsonl"))
    }

    fn write(&self, entry: &AuditEntry) -> Result<(), std::io::Error> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let json_line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(file, "{}", json_line)?;
        file.flush()?;
        Ok(())
    }

    /// Reads every entry back from the file, skipping unparsable lines.
    pub fn read_entries(&self) -> Result<Vec<AuditEntry>, std::io::Error> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    eprintln!("Failed to parse audit entry: {} - Line: {}", e, line);
                }
            }
        }
        Ok(entries)
    }
}

impl AuditSink for DurableAuditLog {
    fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.write(&entry) {
            eprintln!("Failed to write audit entry: {}", e);
        }
    }
}

/// An in-memory audit sink for tests.
#[derive(Default)]
pub struct RecordingAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditLog {
    /// Creates an empty recording log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded entries, in order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAuditLog {
    fn record(&self, entry: AuditEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

/// An audit sink that discards everything.
pub struct NullAuditLog;

impl AuditSink for NullAuditLog {
    fn record(&self, _: AuditEntry) {}
}
