//! Sync orchestrator
//!
//! The top-level coordinator callers actually invoke. It plans chunks per
//! school, drives the SIS client through the retry policy and per-school
//! circuit breakers, persists each batch transactionally, emits coalesced
//! progress events, checkpoints the operation every few batches, and folds
//! everything into a final [`SyncReport`].
//!
//! Failure policy: a failed batch is recorded and the loop continues; a
//! chunk whose fetch exhausts its retries is recorded and the school moves
//! to its next chunk; an open circuit abandons the school and lets the
//! siblings finish. Only configuration errors abort `execute_sync` itself.

use crate::audit::{AuditEntry, AuditSink};
use crate::domain::ids::{OperationId, SchoolCode};
use crate::domain::{Result, RollcallError};
use crate::persistence::AttendanceGateway;
use crate::resilience::{BreakerConfig, BreakerRegistry, RetryConfig, RetryPolicy};
use crate::sis::{FetchOptions, SisClient};
use crate::sync::batch::{Batch, BatchOutcome};
use crate::sync::operation::{
    DateRange, SyncErrorRecord, SyncKind, SyncOperation, SyncStatus,
};
use crate::sync::planner::plan_chunks;
use crate::sync::progress::{ProgressBroadcaster, ProgressEvent};
use crate::sync::report::SyncReport;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Orchestrator configuration, distilled from the loaded config file
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// What triggered the sync
    pub kind: SyncKind,
    /// Date range to synchronize
    pub range: DateRange,
    /// Schools in scope, processed in this order
    pub schools: Vec<SchoolCode>,
    /// Maximum days per chunk
    pub chunk_days: u32,
    /// Records per batch
    pub batch_size: usize,
    /// How many schools may sync concurrently
    pub parallel_schools: usize,
    /// Minimum interval between progress events
    pub progress_update_interval: Duration,
    /// Checkpoint the operation every N batches
    pub checkpoint_every_batches: u64,
    /// Overall operation timeout; observed at batch boundaries
    pub operation_timeout: Option<Duration>,
    /// Free-form metadata recorded on the operation
    pub metadata: BTreeMap<String, String>,
}

impl OrchestratorConfig {
    /// Entry validation; the only failure `execute_sync` raises synchronously
    fn validate(&self) -> Result<()> {
        self.range
            .validate()
            .map_err(RollcallError::Configuration)?;
        if self.schools.is_empty() {
            return Err(RollcallError::Configuration(
                "at least one school is required".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RollcallError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.chunk_days == 0 {
            return Err(RollcallError::Configuration(
                "chunk_days must be at least 1".to_string(),
            ));
        }
        if self.checkpoint_every_batches == 0 {
            return Err(RollcallError::Configuration(
                "checkpoint_every_batches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared per-run state mutated from the batch callback
struct RunState {
    operation: Mutex<SyncOperation>,
    batch_counter: Arc<AtomicU64>,
    batches_attempted: AtomicU64,
    batches_failed: AtomicU64,
}

impl RunState {
    fn lock_operation(&self) -> std::sync::MutexGuard<'_, SyncOperation> {
        self.operation.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// How one school's loop ended
struct SchoolOutcome {
    school: SchoolCode,
    completed: bool,
}

/// Top-level sync coordinator
pub struct SyncOrchestrator {
    config: OrchestratorConfig,
    client: Arc<SisClient>,
    gateway: Arc<dyn AttendanceGateway>,
    audit: Arc<dyn AuditSink>,
    retry: Arc<RetryPolicy>,
    breakers: Arc<BreakerRegistry>,
    progress: Arc<ProgressBroadcaster>,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    /// Create an orchestrator
    ///
    /// `cancel` is the caller's cancellation token; it is polled between
    /// batches, never mid-batch.
    pub fn new(
        config: OrchestratorConfig,
        client: Arc<SisClient>,
        gateway: Arc<dyn AttendanceGateway>,
        audit: Arc<dyn AuditSink>,
        retry_config: RetryConfig,
        breaker_config: BreakerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let progress = Arc::new(ProgressBroadcaster::new(config.progress_update_interval));
        Self {
            config,
            client,
            gateway,
            audit,
            retry: Arc::new(RetryPolicy::new(retry_config)),
            breakers: Arc::new(BreakerRegistry::new(breaker_config)),
            progress,
            cancel,
        }
    }

    /// Subscribe to this orchestrator's progress events
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Execute a new sync operation.
    ///
    /// Always returns a report once entry validation passes; partial
    /// failures are recorded inside it, never thrown.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::Configuration`] for an invalid range, empty
    /// school list, or zero batch/chunk sizes. Nothing else propagates.
    pub async fn execute_sync(&self) -> Result<SyncReport> {
        self.config.validate()?;

        let mut operation =
            SyncOperation::new(self.config.kind, self.config.range, self.config.batch_size);
        operation.metadata.extend(self.config.metadata.clone());
        operation.metadata.insert(
            "schools".to_string(),
            self.config
                .schools
                .iter()
                .map(SchoolCode::as_str)
                .collect::<Vec<_>>()
                .join(","),
        );
        operation
            .metadata
            .insert("chunk_days".to_string(), self.config.chunk_days.to_string());

        self.run(
            operation,
            0,
            self.config.parallel_schools,
            self.config.schools.clone(),
            self.config.chunk_days,
        )
        .await
    }

    /// Resume a checkpointed operation, skipping batches numbered below
    /// `from_batch`.
    ///
    /// The resumed run re-enters the original plan (range, batch size and
    /// school order come from the checkpoint) and forces sequential school
    /// processing so the batch numbering reproduces the original run.
    ///
    /// # Errors
    ///
    /// Returns a state error when no checkpoint exists for `operation_id`,
    /// or a configuration error when the orchestrator's own config is
    /// invalid.
    pub async fn resume_from(
        &self,
        operation_id: &OperationId,
        from_batch: u64,
    ) -> Result<SyncReport> {
        self.config.validate()?;

        let checkpoint = self
            .gateway
            .load_checkpoint(operation_id)
            .await?
            .ok_or_else(|| {
                RollcallError::State(format!("No checkpoint found for operation {operation_id}"))
            })?;

        tracing::info!(
            operation_id = %operation_id,
            from_batch,
            checkpointed_status = %checkpoint.status,
            "Resuming sync operation"
        );

        // The plan identity (school order, chunk width, range, batch size)
        // comes from the checkpoint so the resumed run reproduces the
        // original batch numbering even if the config file changed since.
        let schools = checkpoint
            .metadata
            .get("schools")
            .map(|joined| {
                joined
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(SchoolCode::new)
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(RollcallError::State)
            })
            .transpose()?
            .unwrap_or_else(|| self.config.schools.clone());
        let chunk_days = checkpoint
            .metadata
            .get("chunk_days")
            .and_then(|d| d.parse().ok())
            .unwrap_or(self.config.chunk_days);

        let mut metadata = checkpoint.metadata.clone();
        metadata.insert("resumed_from_batch".to_string(), from_batch.to_string());

        let operation = SyncOperation {
            id: checkpoint.id.clone(),
            kind: checkpoint.kind,
            status: SyncStatus::Pending,
            range: checkpoint.range,
            batch_size: checkpoint.batch_size,
            progress: Default::default(),
            errors: Vec::new(),
            metadata,
            started_at: chrono::Utc::now(),
            finished_at: None,
        };

        self.run(operation, from_batch, 1, schools, chunk_days).await
    }

    async fn run(
        &self,
        operation: SyncOperation,
        skip_before_batch: u64,
        parallelism: usize,
        schools: Vec<SchoolCode>,
        chunk_days: u32,
    ) -> Result<SyncReport> {
        let started = std::time::Instant::now();
        let operation_id = operation.id.clone();
        let range = operation.range;

        tracing::info!(
            operation_id = %operation_id,
            kind = %operation.kind,
            start = %range.start,
            end = %range.end,
            schools = schools.len(),
            batch_size = operation.batch_size,
            "Starting sync operation"
        );

        self.audit.log(
            AuditEntry::new(
                "sync.started",
                json!({
                    "kind": operation.kind.to_string(),
                    "start": range.start.to_string(),
                    "end": range.end.to_string(),
                    "schools": schools.len(),
                }),
            )
            .with_operation(operation_id.as_str()),
        );

        if let Err(e) = self.gateway.save_checkpoint(&operation).await {
            tracing::warn!(error = %e, "Failed to save initial checkpoint");
        }

        // One token covers caller cancellation and the operation timeout;
        // both are observed at the same poll points.
        let run_token = self.cancel.child_token();
        let timed_out = Arc::new(AtomicBool::new(false));
        let watchdog = self.config.operation_timeout.map(|timeout| {
            let token = run_token.clone();
            let flag = timed_out.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                tracing::warn!("Operation timeout reached, cancelling remaining work");
                flag.store(true, Ordering::SeqCst);
                token.cancel();
            })
        });

        let batch_size = operation.batch_size;
        let shared = Arc::new(RunState {
            operation: Mutex::new(operation),
            batch_counter: Arc::new(AtomicU64::new(0)),
            batches_attempted: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
        });

        let outcomes: Vec<SchoolOutcome> = stream::iter(schools)
            .map(|school| {
                self.process_school(
                    school,
                    range,
                    batch_size,
                    chunk_days,
                    shared.clone(),
                    skip_before_batch,
                    run_token.clone(),
                )
            })
            .buffer_unordered(parallelism.max(1))
            .collect()
            .await;

        if let Some(handle) = watchdog {
            handle.abort();
        }

        let cancelled = run_token.is_cancelled();
        let all_completed = outcomes.iter().all(|o| o.completed);
        let failed_schools: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.completed)
            .map(|o| o.school.as_str().to_string())
            .collect();
        let batches_attempted = shared.batches_attempted.load(Ordering::SeqCst);
        let batches_failed = shared.batches_failed.load(Ordering::SeqCst);

        let (final_operation, final_event) = {
            let mut op = shared.lock_operation();

            if cancelled {
                let reason = if timed_out.load(Ordering::SeqCst) {
                    "timeout"
                } else {
                    "requested"
                };
                op.metadata
                    .insert("cancel_reason".to_string(), reason.to_string());
                op.cancel();
            } else if all_completed {
                op.complete();
            } else {
                op.fail();
            }

            let event = ProgressEvent {
                operation_id: op.id.clone(),
                records_processed: op.progress.processed_records,
                total_records: op.progress.total_records,
                percentage: op.progress.percentage(),
                current_operation: format!("finalized: {}", op.status),
            };
            (op.clone(), event)
        };

        if let Err(e) = self.gateway.save_checkpoint(&final_operation).await {
            tracing::warn!(error = %e, "Failed to save final checkpoint");
        }
        self.progress.emit_final(final_event);

        let success = all_completed && !cancelled && batches_failed == 0;
        let report = SyncReport {
            operation_id: final_operation.id.clone(),
            status: final_operation.status,
            success,
            records_processed: final_operation.progress.processed_records,
            records_successful: final_operation.progress.successful_records,
            records_failed: final_operation.progress.failed_records,
            batches_attempted,
            batches_failed,
            retry_attempts: self.retry.retries_total(),
            errors: final_operation.errors.clone(),
            breaker_states: self.breakers.states(),
            failed_schools,
            duration: started.elapsed(),
        };

        self.audit.log(
            AuditEntry::new(
                "sync.finished",
                json!({
                    "status": report.status.to_string(),
                    "success": report.success,
                    "records_processed": report.records_processed,
                    "records_failed": report.records_failed,
                }),
            )
            .with_operation(report.operation_id.as_str()),
        );

        report.log_summary();
        Ok(report)
    }

    async fn process_school(
        &self,
        school: SchoolCode,
        range: DateRange,
        batch_size: usize,
        chunk_days: u32,
        shared: Arc<RunState>,
        skip_before_batch: u64,
        token: CancellationToken,
    ) -> SchoolOutcome {
        let breaker = self.breakers.breaker_for(school.as_str());

        let chunks = match plan_chunks(range.start, range.end, chunk_days) {
            Ok(chunks) => chunks,
            Err(e) => {
                shared.lock_operation().record_error(
                    SyncErrorRecord::new(format!("Failed to plan chunks: {e}"))
                        .with_school(school.as_str()),
                );
                return SchoolOutcome {
                    school,
                    completed: false,
                };
            }
        };

        tracing::info!(
            school = %school,
            chunks = chunks.len(),
            "Processing school"
        );

        let mut completed = true;

        for chunk in chunks {
            if token.is_cancelled() {
                tracing::info!(school = %school, chunk = chunk.index, "Cancellation observed, abandoning remaining chunks");
                completed = false;
                break;
            }

            let options = FetchOptions {
                school_code: school.clone(),
                batch_size,
                batch_counter: shared.batch_counter.clone(),
                skip_before_batch,
                cancel: token.clone(),
            };

            let fetch_result = self
                .client
                .fetch_attendance_batches(
                    chunk.start,
                    chunk.end,
                    &options,
                    &self.retry,
                    &breaker,
                    |batch| {
                        let shared = shared.clone();
                        let school = school.clone();
                        let gateway = self.gateway.clone();
                        let progress = self.progress.clone();
                        let checkpoint_every = self.config.checkpoint_every_batches;
                        async move {
                            Self::handle_batch(
                                batch,
                                school,
                                shared,
                                gateway,
                                progress,
                                checkpoint_every,
                            )
                            .await
                        }
                    },
                )
                .await;

            match fetch_result {
                Ok(outcome) => {
                    if let Some(reported) = outcome.total_records_reported {
                        let mut op = shared.lock_operation();
                        op.progress.total_records =
                            Some(op.progress.total_records.unwrap_or(0) + reported);
                    }
                    if outcome.cancelled {
                        completed = false;
                        break;
                    }
                }
                Err(RollcallError::CircuitOpen { scope }) => {
                    // Remaining chunks would fast-reject; abandon the school
                    // and let siblings continue.
                    tracing::warn!(
                        school = %school,
                        chunk = chunk.index,
                        "Circuit open, abandoning school"
                    );
                    self.audit.log_error(
                        "school.circuit_open",
                        &format!("circuit open for scope {scope}"),
                        json!({ "school": school.as_str(), "chunk": chunk.index }),
                    );
                    shared.lock_operation().record_error(
                        SyncErrorRecord::new(format!(
                            "Circuit open, school abandoned at chunk {}",
                            chunk.index
                        ))
                        .with_school(school.as_str()),
                    );
                    completed = false;
                    break;
                }
                Err(e) => {
                    // Retries exhausted (or another terminal fetch error) for
                    // this chunk; record it and try the next chunk.
                    tracing::error!(
                        school = %school,
                        chunk = chunk.index,
                        error = %e,
                        "Chunk fetch failed"
                    );
                    shared.lock_operation().record_error(
                        SyncErrorRecord::new(format!(
                            "Chunk {} ({} to {}) failed: {e}",
                            chunk.index, chunk.start, chunk.end
                        ))
                        .with_school(school.as_str()),
                    );
                    completed = false;
                }
            }
        }

        SchoolOutcome { school, completed }
    }

    /// Persist one batch and fold its outcome into the shared operation.
    ///
    /// Returns the persistence error (after recording it) so the client
    /// captures the batch as failed in its own outcome; the fetch loop
    /// continues either way.
    async fn handle_batch(
        batch: Batch,
        school: SchoolCode,
        shared: Arc<RunState>,
        gateway: Arc<dyn AttendanceGateway>,
        progress: Arc<ProgressBroadcaster>,
        checkpoint_every: u64,
    ) -> Result<()> {
        let number = batch.number;
        let record_count = batch.records.len() as u64;

        let persist_result = if batch.records.is_empty() {
            Ok(())
        } else {
            gateway.upsert_batch(&batch.records).await
        };

        let mut outcome = match &persist_result {
            Ok(()) => BatchOutcome::success(number, record_count),
            Err(e) => {
                BatchOutcome::failure(number, record_count, format!("Batch persistence failed: {e}"))
            }
        };
        for reason in &batch.rejected {
            outcome.add_rejected(format!("Rejected row: {reason}"));
        }

        let (event, checkpoint_operation) = {
            let mut op = shared.lock_operation();
            op.start();

            op.progress
                .record_batch(number, outcome.successful, outcome.failed);

            for message in &outcome.errors {
                op.record_error(
                    SyncErrorRecord::new(message.clone())
                        .with_batch(number)
                        .with_school(school.as_str()),
                );
            }

            let attempted = shared.batches_attempted.fetch_add(1, Ordering::SeqCst) + 1;
            if persist_result.is_err() {
                shared.batches_failed.fetch_add(1, Ordering::SeqCst);
            }

            let event = ProgressEvent {
                operation_id: op.id.clone(),
                records_processed: op.progress.processed_records,
                total_records: op.progress.total_records,
                percentage: op.progress.percentage(),
                current_operation: format!("school {school} batch {number}"),
            };

            let checkpoint_operation = if attempted % checkpoint_every == 0 {
                Some(op.clone())
            } else {
                None
            };

            (event, checkpoint_operation)
        };

        if let Some(op) = checkpoint_operation {
            if let Err(e) = gateway.save_checkpoint(&op).await {
                // Losing a checkpoint widens the resume window but must not
                // fail the batch.
                tracing::warn!(error = %e, batch = number, "Failed to checkpoint operation");
            }
        }

        progress.emit(event);

        persist_result
    }
}
