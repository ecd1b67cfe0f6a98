//! Audit trail of request lifecycles.
//!
//! Every request gets a fresh trace id. The orchestrator appends one event
//! per lifecycle step:
//!
//! ```text
//! request_received → intent_classified → packs_selected
//!     → [retrieval_performed] → [tool_called]* → response_returned
//! request_received → denied → response_returned
//! ```
//!
//! Sinks must accept concurrent writers. The file sink is append-only and
//! cannot answer lookups; offline readers use [`read_trace`].

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle step recorded by an [`AuditEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    RequestReceived,
    Denied,
    IntentClassified,
    PacksSelected,
    RetrievalPerformed,
    ToolCalled,
    ResponseReturned,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::RequestReceived => "request_received",
            AuditKind::Denied => "denied",
            AuditKind::IntentClassified => "intent_classified",
            AuditKind::PacksSelected => "packs_selected",
            AuditKind::RetrievalPerformed => "retrieval_performed",
            AuditKind::ToolCalled => "tool_called",
            AuditKind::ResponseReturned => "response_returned",
        }
    }
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub kind: AuditKind,
    pub data: Value,
}

impl AuditEvent {
    /// A new event stamped with the current time.
    pub fn new(trace_id: impl Into<String>, kind: AuditKind, data: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            trace_id: trace_id.into(),
            kind,
            data,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("trace not found: {0}")]
    NotFound(String),

    #[error("trace lookup is not supported by this audit sink")]
    NotSupported,

    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn log(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// All events of `trace_id` in emission order.
    fn get(&self, trace_id: &str) -> Result<Vec<AuditEvent>, AuditError>;
}

/// Keeps traces in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    traces: Mutex<HashMap<String, Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace_count(&self) -> usize {
        self.traces.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut traces = self.traces.lock().unwrap_or_else(PoisonError::into_inner);
        traces.entry(event.trace_id.clone()).or_default().push(event);
        Ok(())
    }

    fn get(&self, trace_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
        let traces = self.traces.lock().unwrap_or_else(PoisonError::into_inner);
        traces
            .get(trace_id)
            .cloned()
            .ok_or_else(|| AuditError::NotFound(trace_id.to_string()))
    }
}

/// Appends events as JSON lines to a file.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Open `path` for appending, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn get(&self, _trace_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
        Err(AuditError::NotSupported)
    }
}

/// Scan a JSON-lines audit file for the events of `trace_id`.
///
/// Blank lines are skipped; a malformed line is an error.
pub fn read_trace(path: &Path, trace_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: AuditEvent = serde_json::from_str(&line)?;
        if event.trace_id == trace_id {
            events.push(event);
        }
    }
    if events.is_empty() {
        return Err(AuditError::NotFound(trace_id.to_string()));
    }
    Ok(events)
}
