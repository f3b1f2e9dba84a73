//! Sync command implementation
//!
//! Runs a new sync operation against the configured SIS and date range.

use crate::audit::TracingAuditSink;
use crate::config::{load_config, RollcallConfig};
use crate::domain::SchoolCode;
use crate::persistence::{AttendanceGateway, MemoryGateway, PostgresGateway};
use crate::sis::SisClient;
use crate::sync::operation::{DateRange, SyncKind};
use crate::sync::orchestrator::{OrchestratorConfig, SyncOrchestrator};
use anyhow::Context;
use chrono::NaiveDate;
use clap::Args;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// First day to sync (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: String,

    /// Last day to sync (YYYY-MM-DD)
    #[arg(long)]
    pub end_date: String,

    /// Sync kind: full, incremental or manual
    #[arg(long, default_value = "manual")]
    pub mode: String,

    /// Override school code(s) to sync (comma-separated)
    #[arg(long)]
    pub school: Option<String>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run mode - fetch and validate without writing to PostgreSQL
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    /// Execute the sync command
    pub async fn execute(
        &self,
        config_path: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting sync command");

        let mut config = load_config(config_path)?;

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        if let Some(schools) = &self.school {
            let codes: Vec<String> = schools.split(',').map(|s| s.trim().to_string()).collect();
            tracing::info!(schools = ?codes, "Overriding school codes from CLI");
            config.sync.schools = codes;
        }

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let range = match parse_range(&self.start_date, &self.end_date) {
            Ok(range) => range,
            Err(e) => {
                eprintln!("Invalid date range: {e}");
                return Ok(2);
            }
        };

        let kind = match self.mode.to_lowercase().as_str() {
            "full" => SyncKind::Full,
            "incremental" => SyncKind::Incremental,
            "manual" => SyncKind::Manual,
            other => {
                eprintln!("Invalid mode: {other}. Use 'full', 'incremental' or 'manual'");
                return Ok(2);
            }
        };

        if config.application.dry_run {
            println!("DRY RUN MODE - no data will be written to PostgreSQL");
            println!();
        }

        if !self.yes && !config.application.dry_run {
            println!("Sync Configuration:");
            println!("  Mode: {kind}");
            println!("  Range: {} to {}", range.start, range.end);
            println!("  Schools: {:?}", config.sync.schools);
            println!("  Batch size: {}", config.sync.batch_size);
            println!();
            print!("Proceed with sync? [y/N]: ");
            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Sync cancelled.");
                return Ok(0);
            }
        }

        let orchestrator = build_orchestrator(&config, kind, range, cancel).await?;

        // Print progress as it arrives; the subscription is dropped with the
        // task when the sync finishes.
        let mut progress_rx = orchestrator.subscribe_progress();
        let printer = tokio::spawn(async move {
            while let Ok(event) = progress_rx.recv().await {
                match event.percentage {
                    Some(pct) => println!(
                        "  {:>5.1}% - {} records - {}",
                        pct, event.records_processed, event.current_operation
                    ),
                    None => println!(
                        "  {} records - {}",
                        event.records_processed, event.current_operation
                    ),
                }
            }
        });

        let report = orchestrator.execute_sync().await?;
        printer.abort();

        println!();
        println!("Sync {}", report.status);
        println!("  Operation: {}", report.operation_id);
        println!(
            "  Records: {} processed, {} successful, {} failed",
            report.records_processed, report.records_successful, report.records_failed
        );
        println!(
            "  Batches: {} attempted, {} failed",
            report.batches_attempted, report.batches_failed
        );
        println!("  Retries: {}", report.retry_attempts);
        if !report.failed_schools.is_empty() {
            println!("  Failed schools: {}", report.failed_schools.join(", "));
        }
        println!("  Duration: {:.1}s", report.duration.as_secs_f64());

        Ok(if report.success { 0 } else { 1 })
    }
}

/// Parse and validate a CLI date range
pub(crate) fn parse_range(start: &str, end: &str) -> Result<DateRange, String> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .map_err(|e| format!("start date '{start}': {e}"))?;
    let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
        .map_err(|e| format!("end date '{end}': {e}"))?;
    let range = DateRange { start, end };
    range.validate()?;
    Ok(range)
}

/// Build the gateway, client and orchestrator from a validated config
pub async fn build_orchestrator(
    config: &RollcallConfig,
    kind: SyncKind,
    range: DateRange,
    cancel: CancellationToken,
) -> anyhow::Result<SyncOrchestrator> {
    let gateway: Arc<dyn AttendanceGateway> = if config.application.dry_run {
        tracing::info!("Dry-run: using in-memory gateway");
        Arc::new(MemoryGateway::new())
    } else {
        let pg_config = config
            .postgres
            .clone()
            .context("postgres configuration missing")?;
        let gateway = PostgresGateway::connect(pg_config).await?;
        gateway.test_connection().await?;
        gateway.ensure_schema().await?;
        Arc::new(gateway)
    };

    let client = Arc::new(SisClient::new(config.sis.clone())?);
    client
        .health_check()
        .await
        .context("SIS health check failed")?;

    let schools = config
        .sync
        .schools
        .iter()
        .map(|s| SchoolCode::from_str(s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("invalid school code: {e}"))?;

    let mut metadata = BTreeMap::new();
    metadata.insert("initiated_by".to_string(), "cli".to_string());

    let orchestrator_config = OrchestratorConfig {
        kind,
        range,
        schools,
        chunk_days: config.sync.chunk_days,
        batch_size: config.sync.batch_size,
        parallel_schools: config.sync.parallel_schools,
        progress_update_interval: Duration::from_millis(config.sync.progress_update_interval_ms),
        checkpoint_every_batches: config.sync.checkpoint_every_batches,
        operation_timeout: config.sync.operation_timeout_secs.map(Duration::from_secs),
        metadata,
    };

    Ok(SyncOrchestrator::new(
        orchestrator_config,
        client,
        gateway,
        Arc::new(TracingAuditSink),
        config.sis.retry.to_retry_config(),
        config.sis.circuit_breaker.to_breaker_config(),
        cancel,
    ))
}
