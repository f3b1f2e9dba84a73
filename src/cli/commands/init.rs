//! Init command implementation
//!
//! Writes a starter configuration file.

use clap::Args;
use std::path::Path;

const EXAMPLE_CONFIG: &str = r#"# Rollcall configuration

[application]
log_level = "info"
# dry_run = true

[sis]
base_url = "https://sis.district.example/api"
auth_type = "bearer"
api_token = "${ROLLCALL_SIS_API_TOKEN}"
timeout_seconds = 30
requests_per_minute = 120

[sis.retry]
max_retries = 3
initial_delay_ms = 500
max_delay_ms = 30000
backoff_multiplier = 2.0

[sis.circuit_breaker]
failure_threshold = 5
reset_timeout_secs = 60
half_open_requests = 1

[sync]
schools = ["SCH-01", "SCH-02"]
chunk_days = 30
batch_size = 250
parallel_schools = 1
progress_update_interval_ms = 1000
checkpoint_every_batches = 10
# operation_timeout_secs = 3600

[postgres]
connection_string = "postgres://rollcall@localhost/attendance"
max_connections = 8

[logging]
local_enabled = false
local_path = "logs"
local_rotation = "daily"
"#;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the configuration file
    #[arg(long, default_value = "rollcall.toml")]
    pub output: String,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let path = Path::new(&self.output);

        if path.exists() && !self.force {
            eprintln!(
                "{} already exists; pass --force to overwrite",
                path.display()
            );
            return Ok(2);
        }

        std::fs::write(path, EXAMPLE_CONFIG)?;
        println!("Wrote {}", path.display());
        println!("Set ROLLCALL_SIS_API_TOKEN before running a sync.");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let substituted = EXAMPLE_CONFIG.replace("${ROLLCALL_SIS_API_TOKEN}", "test-token");
        let config: crate::config::RollcallConfig = toml::from_str(&substituted).unwrap();
        assert!(config.validate().is_ok());
    }
}
