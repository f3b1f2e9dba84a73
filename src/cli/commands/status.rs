//! Status command implementation
//!
//! Lists checkpointed sync operations and their recorded progress.

use crate::config::load_config;
use crate::persistence::{AttendanceGateway, PostgresGateway};
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show only the most recent N operations
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = load_config(config_path)?;

        let postgres = match config.postgres {
            Some(pg) => pg,
            None => {
                eprintln!("Status requires the PostgreSQL store to be configured");
                return Ok(2);
            }
        };

        let gateway = PostgresGateway::connect(postgres).await?;
        gateway.test_connection().await?;

        let operations = gateway.list_operations().await?;

        if operations.is_empty() {
            println!("No sync operations recorded.");
            return Ok(0);
        }

        println!("Recent sync operations:");
        println!();
        for operation in operations.iter().take(self.limit) {
            println!("  {}", operation.id);
            println!("    Kind: {}  Status: {}", operation.kind, operation.status);
            println!(
                "    Range: {} to {}  Batch size: {}",
                operation.range.start, operation.range.end, operation.batch_size
            );
            println!(
                "    Progress: {} processed ({} ok, {} failed), batch {}",
                operation.progress.processed_records,
                operation.progress.successful_records,
                operation.progress.failed_records,
                operation.progress.current_batch
            );
            if !operation.errors.is_empty() {
                println!("    Errors: {}", operation.errors.len());
            }
            println!("    Started: {}", operation.started_at);
            if let Some(finished) = operation.finished_at {
                println!("    Finished: {finished}");
            }
            println!();
        }

        Ok(0)
    }
}
