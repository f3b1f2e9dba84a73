//! Resume command implementation
//!
//! Re-enters a checkpointed sync operation, skipping batches below the
//! resume point. The plan (range, batch size, school order) is recovered
//! from the checkpoint itself.

use crate::cli::commands::sync::build_orchestrator;
use crate::config::load_config;
use crate::domain::ids::OperationId;
use crate::sync::operation::DateRange;
use clap::Args;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// Arguments for the resume command
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Operation to resume
    #[arg(long)]
    pub operation_id: String,

    /// First batch number to process; earlier batches are skipped
    #[arg(long, default_value_t = 1)]
    pub from_batch: u64,
}

impl ResumeArgs {
    /// Execute the resume command
    pub async fn execute(
        &self,
        config_path: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<i32> {
        tracing::info!(
            operation_id = %self.operation_id,
            from_batch = self.from_batch,
            "Starting resume command"
        );

        let config = load_config(config_path)?;

        if config.application.dry_run {
            eprintln!("Resume requires the PostgreSQL store; disable application.dry_run");
            return Ok(2);
        }

        let operation_id = match OperationId::from_str(&self.operation_id) {
            Ok(id) => id,
            Err(e) => {
                eprintln!("Invalid operation ID: {e}");
                return Ok(2);
            }
        };

        // The kind and range passed here are placeholders; resume_from
        // recovers the real plan from the checkpoint.
        let placeholder_range = DateRange {
            start: chrono::Utc::now().date_naive(),
            end: chrono::Utc::now().date_naive(),
        };
        let orchestrator = build_orchestrator(
            &config,
            crate::sync::operation::SyncKind::Manual,
            placeholder_range,
            cancel,
        )
        .await?;

        let report = orchestrator
            .resume_from(&operation_id, self.from_batch)
            .await?;

        println!("Resume {}", report.status);
        println!(
            "  Records: {} processed, {} successful, {} failed",
            report.records_processed, report.records_successful, report.records_failed
        );
        println!(
            "  Batches: {} attempted, {} failed",
            report.batches_attempted, report.batches_failed
        );
        println!("  Duration: {:.1}s", report.duration.as_secs_f64());

        Ok(if report.success { 0 } else { 1 })
    }
}
