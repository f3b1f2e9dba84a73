//! Configuration schema types
//!
//! This module defines the configuration structure for Rollcall, mapped from
//! the TOML file. Every section carries its own `validate()`; validation runs
//! once at load time so the sync engine can assume a well-formed config.

use crate::config::SecretString;
use crate::resilience::{BreakerConfig, RetryConfig};
use crate::sis::rate_limit::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main Rollcall configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollcallConfig {
    /// Application-level settings
    pub application: ApplicationConfig,

    /// SIS connection and resilience settings
    pub sis: SisConfig,

    /// Sync engine settings
    pub sync: SyncSettings,

    /// PostgreSQL configuration (required unless running dry-run)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RollcallConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.sis.validate()?;
        self.sync.validate()?;

        if let Some(ref postgres) = self.postgres {
            postgres.validate()?;
        } else if !self.application.dry_run {
            return Err(
                "postgres configuration is required unless application.dry_run = true".to_string(),
            );
        }

        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (fetch and validate, don't write to PostgreSQL)
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetrySettings {
    /// Build the runtime retry config
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures before the breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before allowing probes
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,

    /// Probe calls permitted while half-open
    #[serde(default = "default_half_open_requests")]
    pub half_open_requests: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
            half_open_requests: default_half_open_requests(),
        }
    }
}

impl BreakerSettings {
    /// Build the runtime breaker config
    pub fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
            half_open_requests: self.half_open_requests,
        }
    }
}

/// SIS server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SisConfig {
    /// Base URL of the SIS API
    pub base_url: String,

    /// Authentication type: "basic", "bearer" or "none"
    #[serde(default = "default_auth_type")]
    pub auth_type: String,

    /// Username for basic authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for basic authentication
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub password: Option<SecretString>,

    /// API token for bearer authentication
    #[serde(default)]
    pub api_token: Option<SecretString>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// TLS certificate verification enabled
    ///
    /// Disabling this exposes the application to man-in-the-middle attacks
    /// and should only be used against development SIS instances.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// Requests-per-minute ceiling enforced by the client
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetrySettings,

    /// Circuit breaker configuration
    #[serde(default)]
    pub circuit_breaker: BreakerSettings,
}

impl SisConfig {
    fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("sis.base_url cannot be empty".to_string());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!(
                "sis.base_url must start with http:// or https://, got: {}",
                self.base_url
            ));
        }

        match self.auth_type.as_str() {
            "basic" => {
                if self.username.is_none() || self.password.is_none() {
                    return Err(
                        "sis.username and sis.password are required when auth_type = 'basic'"
                            .to_string(),
                    );
                }
            }
            "bearer" => {
                if self.api_token.is_none() {
                    return Err(
                        "sis.api_token is required when auth_type = 'bearer'".to_string()
                    );
                }
            }
            "none" => {}
            other => {
                return Err(format!(
                    "Invalid sis.auth_type '{other}'. Must be one of: basic, bearer, none"
                ));
            }
        }

        if self.requests_per_minute == 0 {
            return Err("sis.requests_per_minute must be at least 1".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("sis.timeout_seconds must be at least 1".to_string());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err("sis.retry.backoff_multiplier must be >= 1.0".to_string());
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err("sis.circuit_breaker.failure_threshold must be at least 1".to_string());
        }
        if self.circuit_breaker.half_open_requests == 0 {
            return Err("sis.circuit_breaker.half_open_requests must be at least 1".to_string());
        }
        Ok(())
    }

    /// Build the runtime rate limit config
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.requests_per_minute,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for SisConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/sis".to_string(),
            auth_type: default_auth_type(),
            username: None,
            password: None,
            api_token: None,
            timeout_seconds: default_timeout_seconds(),
            tls_verify: true,
            requests_per_minute: default_requests_per_minute(),
            retry: RetrySettings::default(),
            circuit_breaker: BreakerSettings::default(),
        }
    }
}

/// Sync engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// School codes to synchronize
    pub schools: Vec<String>,

    /// Maximum days per chunk
    #[serde(default = "default_chunk_days")]
    pub chunk_days: u32,

    /// Records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How many schools may sync concurrently
    #[serde(default = "default_parallel_schools")]
    pub parallel_schools: usize,

    /// Minimum milliseconds between progress events
    #[serde(default = "default_progress_interval_ms")]
    pub progress_update_interval_ms: u64,

    /// Checkpoint the operation every N batches
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every_batches: u64,

    /// Overall operation timeout in seconds; unlimited when absent
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

impl SyncSettings {
    fn validate(&self) -> Result<(), String> {
        if self.schools.is_empty() {
            return Err("sync.schools cannot be empty".to_string());
        }
        for school in &self.schools {
            crate::domain::SchoolCode::new(school.clone())
                .map_err(|e| format!("sync.schools: {e}"))?;
        }
        if self.chunk_days == 0 {
            return Err("sync.chunk_days must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            return Err("sync.batch_size must be at least 1".to_string());
        }
        if self.parallel_schools == 0 {
            return Err("sync.parallel_schools must be at least 1".to_string());
        }
        if self.checkpoint_every_batches == 0 {
            return Err("sync.checkpoint_every_batches must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            schools: Vec::new(),
            chunk_days: default_chunk_days(),
            batch_size: default_batch_size(),
            parallel_schools: default_parallel_schools(),
            progress_update_interval_ms: default_progress_interval_ms(),
            checkpoint_every_batches: default_checkpoint_every(),
            operation_timeout_secs: None,
        }
    }
}

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Connection string (postgres://...)
    pub connection_string: String,

    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_connection_timeout_seconds")]
    pub connection_timeout_seconds: u64,

    /// Per-statement timeout in seconds
    #[serde(default = "default_statement_timeout_seconds")]
    pub statement_timeout_seconds: u64,
}

impl PostgresConfig {
    fn validate(&self) -> Result<(), String> {
        if self.connection_string.is_empty() {
            return Err("postgres.connection_string cannot be empty".to_string());
        }
        if self.max_connections == 0 {
            return Err("postgres.max_connections must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write JSON logs to a local file
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for local log files
    #[serde(default = "default_log_path")]
    pub local_path: String,

    /// Rotation: "daily" or "hourly"
    #[serde(default = "default_log_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        if !["daily", "hourly"].contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be 'daily' or 'hourly'",
                self.local_rotation
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_log_path(),
            local_rotation: default_log_rotation(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_auth_type() -> String {
    "none".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_requests_per_minute() -> u32 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_secs() -> u64 {
    60
}

fn default_half_open_requests() -> u32 {
    1
}

fn default_chunk_days() -> u32 {
    30
}

fn default_batch_size() -> usize {
    250
}

fn default_parallel_schools() -> usize {
    1
}

fn default_progress_interval_ms() -> u64 {
    1_000
}

fn default_checkpoint_every() -> u64 {
    10
}

fn default_max_connections() -> usize {
    8
}

fn default_connection_timeout_seconds() -> u64 {
    10
}

fn default_statement_timeout_seconds() -> u64 {
    30
}

fn default_log_path() -> String {
    "logs".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> RollcallConfig {
        RollcallConfig {
            application: ApplicationConfig {
                log_level: "info".to_string(),
                dry_run: true,
            },
            sis: SisConfig::default(),
            sync: SyncSettings {
                schools: vec!["SCH-01".to_string()],
                ..SyncSettings::default()
            },
            postgres: None,
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = valid_config();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_postgres_required_unless_dry_run() {
        let mut config = valid_config();
        config.application.dry_run = false;
        let err = config.validate().unwrap_err();
        assert!(err.contains("postgres"));
    }

    #[test]
    fn test_empty_schools_rejected() {
        let mut config = valid_config();
        config.sync.schools.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_school_with_whitespace_rejected() {
        let mut config = valid_config();
        config.sync.schools = vec!["SCH 01".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.sync.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("batch_size"));
    }

    #[test]
    fn test_zero_chunk_days_rejected() {
        let mut config = valid_config();
        config.sync.chunk_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut config = valid_config();
        config.sis.base_url = "ftp://sis.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_basic_auth_requires_credentials() {
        let mut config = valid_config();
        config.sis.auth_type = "basic".to_string();
        assert!(config.validate().is_err());

        config.sis.username = Some("svc-rollcall".to_string());
        config.sis.password = Some(crate::config::secret_string("hunter2".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bearer_auth_requires_token() {
        let mut config = valid_config();
        config.sis.auth_type = "bearer".to_string();
        assert!(config.validate().is_err());

        config.sis.api_token = Some(crate::config::secret_string("tok".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_settings_conversion() {
        let settings = RetrySettings {
            max_retries: 4,
            initial_delay_ms: 250,
            max_delay_ms: 10_000,
            backoff_multiplier: 1.5,
        };
        let config = settings.to_retry_config();
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_breaker_settings_conversion() {
        let settings = BreakerSettings::default();
        let config = settings.to_breaker_config();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.reset_timeout, Duration::from_secs(60));
        assert_eq!(config.half_open_requests, 1);
    }

    #[test]
    fn test_defaults_parse_from_minimal_toml() {
        let toml_str = r#"
[application]

[sis]
base_url = "https://sis.district.example"

[sync]
schools = ["SCH-01", "SCH-02"]

[postgres]
connection_string = "postgres://rollcall@localhost/attendance"
"#;
        let config: RollcallConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.sync.chunk_days, 30);
        assert_eq!(config.sync.batch_size, 250);
        assert_eq!(config.sis.requests_per_minute, 120);
        assert_eq!(config.sis.retry.max_retries, 3);
        assert!(config.validate().is_ok());
    }
}
