//! Sync operation state
//!
//! This module defines the checkpointable record of one sync-engine
//! invocation: its lifecycle status, progress counters, and accumulated
//! errors. The operation document is persisted through the gateway after
//! every few batches so a crashed run can resume from the last checkpoint.

use crate::domain::ids::OperationId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What triggered the sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// Complete re-pull of the configured range
    Full,
    /// Scheduled pull of recent days
    Incremental,
    /// Operator-triggered run
    Manual,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Operation lifecycle status
///
/// `Completed`, `Failed` and `Cancelled` are terminal; a terminal operation
/// never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl SyncStatus {
    /// Whether this status permits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Inclusive calendar date range being synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Validate that the range is not inverted
    pub fn validate(&self) -> Result<(), String> {
        if self.start > self.end {
            return Err(format!(
                "Invalid date range: start {} is after end {}",
                self.start, self.end
            ));
        }
        Ok(())
    }
}

/// Progress snapshot mutated after every batch
///
/// Maintains the invariant `processed_records == successful_records +
/// failed_records`; the only mutation path is [`SyncProgress::record_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Total records expected, when the remote reports it
    pub total_records: Option<u64>,
    /// Records handled so far (successful + failed)
    pub processed_records: u64,
    /// Records persisted successfully
    pub successful_records: u64,
    /// Records that failed validation or persistence
    pub failed_records: u64,
    /// Highest batch sequence number dispatched so far
    pub current_batch: u64,
    /// Total batches, once known
    pub total_batches: Option<u64>,
}

impl SyncProgress {
    /// Fold one batch outcome into the snapshot
    pub fn record_batch(&mut self, batch_number: u64, successful: u64, failed: u64) {
        self.processed_records += successful + failed;
        self.successful_records += successful;
        self.failed_records += failed;
        self.current_batch = self.current_batch.max(batch_number);
    }

    /// Completion percentage, when the total is known
    pub fn percentage(&self) -> Option<f64> {
        self.total_records.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.processed_records as f64 / total as f64) * 100.0
            }
        })
    }
}

/// One recorded sync error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    /// Batch the error belongs to, if batch-scoped
    pub batch_number: Option<u64>,
    /// School the error belongs to, if school-scoped
    pub school_code: Option<String>,
    /// Human-readable description
    pub message: String,
    /// When the error was recorded
    pub at: DateTime<Utc>,
}

impl SyncErrorRecord {
    /// Create an error record stamped with the current time
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            batch_number: None,
            school_code: None,
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// Attach the batch sequence number
    pub fn with_batch(mut self, batch_number: u64) -> Self {
        self.batch_number = Some(batch_number);
        self
    }

    /// Attach the school code
    pub fn with_school(mut self, school_code: impl Into<String>) -> Self {
        self.school_code = Some(school_code.into());
        self
    }
}

/// Checkpointable record of one sync-engine invocation
///
/// Owned exclusively by the orchestrator; everything else sees it through
/// checkpoints. Terminal statuses are immutable: `start`, `complete`,
/// `fail` and `cancel` are no-ops once the operation has finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Opaque unique identifier
    pub id: OperationId,

    /// What triggered the operation
    pub kind: SyncKind,

    /// Lifecycle status
    pub status: SyncStatus,

    /// Requested date range
    pub range: DateRange,

    /// Configured batch size
    pub batch_size: usize,

    /// Progress counters
    pub progress: SyncProgress,

    /// Ordered list of recorded errors
    pub errors: Vec<SyncErrorRecord>,

    /// Free-form metadata (initiating actor, school scope, ...)
    pub metadata: BTreeMap<String, String>,

    /// When the operation was created
    pub started_at: DateTime<Utc>,

    /// When the operation reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncOperation {
    /// Create a new operation in `Pending`
    pub fn new(kind: SyncKind, range: DateRange, batch_size: usize) -> Self {
        Self {
            id: OperationId::generate(),
            kind,
            status: SyncStatus::Pending,
            range,
            batch_size,
            progress: SyncProgress::default(),
            errors: Vec::new(),
            metadata: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Transition `Pending` -> `InProgress` on first batch dispatch
    pub fn start(&mut self) {
        if self.status == SyncStatus::Pending {
            self.status = SyncStatus::InProgress;
        }
    }

    /// Finalize as `Completed`
    pub fn complete(&mut self) {
        self.finalize(SyncStatus::Completed);
    }

    /// Finalize as `Failed`
    pub fn fail(&mut self) {
        self.finalize(SyncStatus::Failed);
    }

    /// Finalize as `Cancelled`
    pub fn cancel(&mut self) {
        self.finalize(SyncStatus::Cancelled);
    }

    fn finalize(&mut self, status: SyncStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Record an error without changing status
    pub fn record_error(&mut self, error: SyncErrorRecord) {
        self.errors.push(error);
    }

    /// Whether the operation has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
