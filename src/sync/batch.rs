//! Batches - the unit of persistence
//!
//! A batch is a bounded group of attendance records drawn from one chunk's
//! remote results. Batches are numbered from an operation-global counter
//! before dispatch; the numbers are strictly increasing and gap-free, which
//! is what `resume --from-batch N` relies on.

use crate::domain::ids::SchoolCode;
use crate::domain::AttendanceRecord;

/// A numbered group of records ready for persistence
#[derive(Debug, Clone)]
pub struct Batch {
    /// Operation-global sequence number, assigned before dispatch
    pub number: u64,
    /// School the records belong to
    pub school_code: SchoolCode,
    /// The validated records
    pub records: Vec<AttendanceRecord>,
    /// Descriptors of rows quarantined while this batch was accumulating;
    /// they count toward the batch's failed records
    pub rejected: Vec<String>,
}

impl Batch {
    /// Number of records carried
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch carries no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of processing one batch
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Batch sequence number
    pub number: u64,
    /// Records persisted successfully
    pub successful: u64,
    /// Records rejected at validation or lost to a failed write
    pub failed: u64,
    /// Per-record error descriptors
    pub errors: Vec<String>,
}

impl BatchOutcome {
    /// Outcome for a batch that persisted fully
    pub fn success(number: u64, records: u64) -> Self {
        Self {
            number,
            successful: records,
            failed: 0,
            errors: Vec::new(),
        }
    }

    /// Outcome for a batch whose write failed as a whole
    pub fn failure(number: u64, records: u64, error: impl Into<String>) -> Self {
        Self {
            number,
            successful: 0,
            failed: records,
            errors: vec![error.into()],
        }
    }

    /// Add a quarantined-record error
    pub fn add_rejected(&mut self, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttendanceStatus, StudentId};
    use chrono::NaiveDate;

    fn record(student: &str) -> AttendanceRecord {
        AttendanceRecord {
            student_id: StudentId::new(student).unwrap(),
            school_code: SchoolCode::new("SCH-01").unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 8, 15).unwrap(),
            status: AttendanceStatus::Present,
            minutes_absent: None,
            comment: None,
        }
    }

    #[test]
    fn test_batch_len() {
        let batch = Batch {
            number: 1,
            school_code: SchoolCode::new("SCH-01").unwrap(),
            records: vec![record("1"), record("2")],
            rejected: Vec::new(),
        };
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_outcome_success() {
        let outcome = BatchOutcome::success(3, 25);
        assert_eq!(outcome.successful, 25);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_outcome_failure() {
        let outcome = BatchOutcome::failure(3, 25, "transaction aborted");
        assert_eq!(outcome.successful, 0);
        assert_eq!(outcome.failed, 25);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_outcome_rejected_records() {
        let mut outcome = BatchOutcome::success(3, 23);
        outcome.add_rejected("row 12: unknown status 'Z'");
        outcome.add_rejected("row 19: missing student_id");

        assert_eq!(outcome.successful, 23);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.errors.len(), 2);
    }
}
