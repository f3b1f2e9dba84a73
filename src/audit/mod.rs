//! Audit sink
//!
//! Structured compliance trail for sync activity. The sink is injected into
//! the orchestrator at construction so tests can capture entries without
//! touching global logger state. Logging is fire-and-forget: a sink that
//! drops entries must never abort the sync.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Mutex;

/// One audit trail entry
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// What happened, e.g. "sync.started", "batch.persisted"
    pub action: String,
    /// Operation the entry belongs to, when applicable
    pub operation_id: Option<String>,
    /// Structured detail payload
    pub detail: Value,
    /// When the entry was recorded
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an entry stamped with the current time
    pub fn new(action: impl Into<String>, detail: Value) -> Self {
        Self {
            action: action.into(),
            operation_id: None,
            detail,
            at: Utc::now(),
        }
    }

    /// Attach the operation ID
    pub fn with_operation(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }
}

/// Destination for audit entries
pub trait AuditSink: Send + Sync {
    /// Record an entry; must not fail upward
    fn log(&self, entry: AuditEntry);

    /// Record an error with context; must not fail upward
    fn log_error(&self, action: &str, error: &str, metadata: Value);
}

/// Default sink emitting structured tracing events
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log(&self, entry: AuditEntry) {
        tracing::info!(
            target: "rollcall::audit",
            action = %entry.action,
            operation_id = entry.operation_id.as_deref().unwrap_or("-"),
            detail = %entry.detail,
            "audit"
        );
    }

    fn log_error(&self, action: &str, error: &str, metadata: Value) {
        tracing::error!(
            target: "rollcall::audit",
            action = action,
            error = error,
            metadata = %metadata,
            "audit"
        );
    }
}

/// Sink capturing entries in memory, for tests
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    /// Create an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured entries
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Actions captured, in order
    pub fn actions(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.action).collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn log(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    fn log_error(&self, action: &str, error: &str, metadata: Value) {
        let entry = AuditEntry::new(
            action,
            serde_json::json!({ "error": error, "metadata": metadata }),
        );
        self.log(entry);
    }
}
