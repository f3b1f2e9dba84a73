//! Sync report
//!
//! The final aggregation of an operation's outcome, returned to the caller
//! whether the run succeeded, limped home with partial failures, or was
//! cancelled. `execute_sync` never throws after entry validation; callers
//! decide from the report whether to resume, alert, or accept partial data.

use crate::domain::ids::OperationId;
use crate::resilience::BreakerState;
use crate::sync::operation::{SyncErrorRecord, SyncStatus};
use std::collections::BTreeMap;
use std::time::Duration;

/// Aggregated outcome of one sync operation
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// The operation this report describes
    pub operation_id: OperationId,

    /// Terminal status the operation finalized with
    pub status: SyncStatus,

    /// True only if every planned batch was attempted and nothing failed
    pub success: bool,

    /// Records handled (successful + failed)
    pub records_processed: u64,

    /// Records persisted successfully
    pub records_successful: u64,

    /// Records rejected or lost to failed writes
    pub records_failed: u64,

    /// Batches dispatched
    pub batches_attempted: u64,

    /// Batches whose persistence failed
    pub batches_failed: u64,

    /// Cumulative request retries performed
    pub retry_attempts: u64,

    /// Every error recorded during the run
    pub errors: Vec<SyncErrorRecord>,

    /// Breaker state per school at operation end
    pub breaker_states: BTreeMap<String, BreakerState>,

    /// Schools whose sync loop aborted before attempting all planned work
    pub failed_schools: Vec<String>,

    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl SyncReport {
    /// Fraction of processed records that persisted, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.records_processed == 0 {
            return 100.0;
        }
        (self.records_successful as f64 / self.records_processed as f64) * 100.0
    }

    /// Log the report at an appropriate level
    pub fn log_summary(&self) {
        tracing::info!(
            operation_id = %self.operation_id,
            status = %self.status,
            success = self.success,
            records_processed = self.records_processed,
            successful = self.records_successful,
            failed = self.records_failed,
            batches_attempted = self.batches_attempted,
            batches_failed = self.batches_failed,
            retry_attempts = self.retry_attempts,
            duration_secs = self.duration.as_secs(),
            success_rate = format!("{:.2}%", self.success_rate()),
            "Sync completed"
        );

        if !self.failed_schools.is_empty() {
            tracing::warn!(
                schools = ?self.failed_schools,
                "Schools did not complete their sync"
            );
        }

        if !self.errors.is_empty() {
            tracing::warn!(error_count = self.errors.len(), "Sync completed with errors");
            for error in &self.errors {
                tracing::warn!(
                    batch = ?error.batch_number,
                    school = ?error.school_code,
                    message = %error.message,
                    "Sync error"
                );
            }
        }

        for (scope, state) in &self.breaker_states {
            if *state != BreakerState::Closed {
                tracing::warn!(scope = %scope, state = %state, "Circuit breaker not closed at operation end");
            }
        }
    }
}
