//! Sync engine core
//!
//! This module contains the orchestration logic: chunk planning, the
//! operation state machine, batch bookkeeping, progress emission, and the
//! top-level orchestrator.
//!
//! # Sync Workflow
//!
//! 1. **Validate**: configuration errors abort before any work starts
//! 2. **Plan**: the date range is split into bounded chunks per school
//! 3. **Fetch**: the SIS client pages through each chunk, slicing results
//!    into numbered batches, with every request routed through the retry
//!    policy and the school's circuit breaker
//! 4. **Persist**: each batch is upserted in one transaction
//! 5. **Checkpoint**: the operation document is saved every few batches
//! 6. **Report**: totals, errors and breaker states aggregate into a
//!    [`SyncReport`]

pub mod batch;
pub mod operation;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod report;

pub use batch::{Batch, BatchOutcome};
pub use operation::{DateRange, SyncKind, SyncOperation, SyncProgress, SyncStatus};
pub use orchestrator::{OrchestratorConfig, SyncOrchestrator};
pub use planner::{plan_chunks, DateChunk};
pub use progress::{ProgressBroadcaster, ProgressEvent};
pub use report::SyncReport;
