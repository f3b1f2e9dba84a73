//! Configuration management for Rollcall.
//!
//! This module provides TOML-based configuration loading, parsing, and
//! validation.
//!
//! # Overview
//!
//! Rollcall uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - Default values for optional settings
//! - `ROLLCALL_*` environment overrides
//! - Type-safe configuration structs validated on load
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [sis]
//! base_url = "https://sis.district.example/api"
//! auth_type = "bearer"
//! api_token = "${ROLLCALL_SIS_API_TOKEN}"
//! requests_per_minute = 120
//!
//! [sis.retry]
//! max_retries = 3
//! initial_delay_ms = 500
//!
//! [sis.circuit_breaker]
//! failure_threshold = 5
//! reset_timeout_secs = 60
//!
//! [sync]
//! schools = ["SCH-01", "SCH-02"]
//! chunk_days = 30
//! batch_size = 250
//!
//! [postgres]
//! connection_string = "postgres://rollcall@localhost/attendance"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    ApplicationConfig, BreakerSettings, LoggingConfig, PostgresConfig, RetrySettings,
    RollcallConfig, SisConfig, SyncSettings,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
