//! Validate-config command implementation

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        match load_config(config_path) {
            Ok(config) => {
                println!("Configuration is valid.");
                println!("  SIS: {}", config.sis.base_url);
                println!("  Schools: {:?}", config.sync.schools);
                println!(
                    "  Chunk days: {}  Batch size: {}",
                    config.sync.chunk_days, config.sync.batch_size
                );
                println!(
                    "  Store: {}",
                    if config.application.dry_run {
                        "dry-run (in-memory)"
                    } else {
                        "postgresql"
                    }
                );
                Ok(0)
            }
            Err(e) => {
                eprintln!("Configuration is invalid: {e}");
                Ok(2)
            }
        }
    }
}
