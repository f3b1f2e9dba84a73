//! In-memory gateway
//!
//! Backs unit and integration tests, and the CLI's dry-run mode. Upserts go
//! into a map keyed on (student, date) so replay behaves exactly like the
//! PostgreSQL gateway's `ON CONFLICT` path. Failure injection lets tests
//! exercise the orchestrator's partial-failure handling.

use crate::domain::ids::{OperationId, StudentId};
use crate::domain::{AttendanceRecord, Result, RollcallError};
use crate::persistence::traits::AttendanceGateway;
use crate::sync::operation::SyncOperation;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// In-memory implementation of [`AttendanceGateway`]
#[derive(Default)]
pub struct MemoryGateway {
    records: Mutex<HashMap<(StudentId, NaiveDate), AttendanceRecord>>,
    checkpoints: Mutex<HashMap<OperationId, SyncOperation>>,
    upsert_calls: AtomicU64,
    /// Batch numbers (1-based upsert call indexes) that should fail
    fail_on_calls: Mutex<Vec<u64>>,
}

impl MemoryGateway {
    /// Create an empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the Nth, Mth, ... upsert calls fail (1-based)
    pub fn fail_on_upsert_calls(&self, calls: &[u64]) {
        let mut fail = self.fail_on_calls.lock().unwrap_or_else(|e| e.into_inner());
        fail.extend_from_slice(calls);
    }

    /// Number of distinct attendance rows stored
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of upsert calls made
    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Fetch a stored record by its natural key
    pub fn get(&self, student: &StudentId, date: NaiveDate) -> Option<AttendanceRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(student.clone(), date))
            .cloned()
    }
}

#[async_trait]
impl AttendanceGateway for MemoryGateway {
    async fn upsert_batch(&self, records: &[AttendanceRecord]) -> Result<()> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let fail = self.fail_on_calls.lock().unwrap_or_else(|e| e.into_inner());
            if fail.contains(&call) {
                return Err(RollcallError::Persistence(format!(
                    "injected failure on upsert call {call}"
                )));
            }
        }

        // All-or-nothing: build the new state before swapping anything in
        let mut store = self.records.lock().unwrap_or_else(|e| e.into_inner());
        for record in records {
            store.insert(
                (record.student_id.clone(), record.date),
                record.clone(),
            );
        }
        Ok(())
    }

    async fn save_checkpoint(&self, operation: &SyncOperation) -> Result<()> {
        let mut checkpoints = self
            .checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        checkpoints.insert(operation.id.clone(), operation.clone());
        Ok(())
    }

    async fn load_checkpoint(&self, id: &OperationId) -> Result<Option<SyncOperation>> {
        let checkpoints = self
            .checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Ok(checkpoints.get(id).cloned())
    }

    async fn list_operations(&self) -> Result<Vec<SyncOperation>> {
        let checkpoints = self
            .checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let mut operations: Vec<_> = checkpoints.values().cloned().collect();
        operations.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttendanceStatus, SchoolCode};
    use crate::sync::operation::{DateRange, SyncKind};

    fn record(student: &str, day: u32) -> AttendanceRecord {
        AttendanceRecord {
            student_id: StudentId::new(student).unwrap(),
            school_code: SchoolCode::new("SCH-01").unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 8, day).unwrap(),
            status: AttendanceStatus::Present,
            minutes_absent: None,
            comment: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let gateway = MemoryGateway::new();
        let batch = vec![record("1", 15), record("2", 15)];

        gateway.upsert_batch(&batch).await.unwrap();
        gateway.upsert_batch(&batch).await.unwrap();

        // Replay does not duplicate rows
        assert_eq!(gateway.record_count(), 2);
        assert_eq!(gateway.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_on_conflict() {
        let gateway = MemoryGateway::new();
        gateway.upsert_batch(&[record("1", 15)]).await.unwrap();

        let mut updated = record("1", 15);
        updated.status = AttendanceStatus::Tardy;
        gateway.upsert_batch(&[updated]).await.unwrap();

        let stored = gateway
            .get(&StudentId::new("1").unwrap(), NaiveDate::from_ymd_opt(2024, 8, 15).unwrap())
            .unwrap();
        assert_eq!(stored.status, AttendanceStatus::Tardy);
        assert_eq!(gateway.record_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let gateway = MemoryGateway::new();
        gateway.fail_on_upsert_calls(&[2]);

        gateway.upsert_batch(&[record("1", 15)]).await.unwrap();
        let err = gateway.upsert_batch(&[record("2", 15)]).await.unwrap_err();
        assert!(matches!(err, RollcallError::Persistence(_)));

        // The failed batch wrote nothing
        assert_eq!(gateway.record_count(), 1);

        gateway.upsert_batch(&[record("3", 15)]).await.unwrap();
        assert_eq!(gateway.record_count(), 2);
    }

    #[tokio::test]
    async fn test_checkpoint_roundtrip() {
        let gateway = MemoryGateway::new();
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 8, 15).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 8, 17).unwrap(),
        };
        let mut op = SyncOperation::new(SyncKind::Full, range, 100);
        op.start();

        gateway.save_checkpoint(&op).await.unwrap();
        let loaded = gateway.load_checkpoint(&op.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, op.id);
        assert_eq!(loaded.status, op.status);

        let missing = gateway
            .load_checkpoint(&OperationId::new("nope").unwrap())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_operations_most_recent_first() {
        let gateway = MemoryGateway::new();
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 8, 15).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 8, 17).unwrap(),
        };

        let older = SyncOperation::new(SyncKind::Full, range, 100);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = SyncOperation::new(SyncKind::Incremental, range, 100);

        gateway.save_checkpoint(&older).await.unwrap();
        gateway.save_checkpoint(&newer).await.unwrap();

        let listed = gateway.list_operations().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
    }
}
