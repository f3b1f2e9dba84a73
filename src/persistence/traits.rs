//! Persistence gateway trait
//!
//! The sync engine's only requirements of its store: batch writes are atomic
//! (all rows commit or none do) and idempotent under replay (keyed upsert on
//! student + date), and operation checkpoints can be saved and loaded for
//! crash-recoverable resumption.

use crate::domain::ids::OperationId;
use crate::domain::{AttendanceRecord, Result};
use crate::sync::operation::SyncOperation;
use async_trait::async_trait;

/// Gateway to the attendance store
#[async_trait]
pub trait AttendanceGateway: Send + Sync {
    /// Upsert one batch of records inside a single transaction.
    ///
    /// Must be atomic and idempotent: replaying the same batch after a crash
    /// cannot duplicate rows.
    async fn upsert_batch(&self, records: &[AttendanceRecord]) -> Result<()>;

    /// Save (upsert) an operation checkpoint
    async fn save_checkpoint(&self, operation: &SyncOperation) -> Result<()>;

    /// Load a previously checkpointed operation
    async fn load_checkpoint(&self, id: &OperationId) -> Result<Option<SyncOperation>>;

    /// List checkpointed operations, most recent first
    async fn list_operations(&self) -> Result<Vec<SyncOperation>>;
}
