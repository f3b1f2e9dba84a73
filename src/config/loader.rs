//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::RollcallConfig;
use crate::domain::errors::RollcallError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into RollcallConfig
/// 4. Applies environment variable overrides (`ROLLCALL_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use rollcall::config::loader::load_config;
///
/// let config = load_config("rollcall.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<RollcallConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(RollcallError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        RollcallError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    // Perform environment variable substitution
    let contents = substitute_env_vars(&contents)?;

    // Parse TOML
    let mut config: RollcallConfig = toml::from_str(&contents)
        .map_err(|e| RollcallError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    // Apply environment variable overrides
    apply_env_overrides(&mut config);

    // Validate configuration
    config.validate().map_err(|e| {
        RollcallError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    // Process line by line to skip comments
    for line in input.lines() {
        let trimmed = line.trim_start();

        // Skip comment lines - don't process env vars in comments
        if trimmed.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(RollcallError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the `ROLLCALL_*` prefix
///
/// Environment variables follow the pattern: `ROLLCALL_<SECTION>_<KEY>`
/// For example: `ROLLCALL_SIS_BASE_URL`, `ROLLCALL_SYNC_BATCH_SIZE`
fn apply_env_overrides(config: &mut RollcallConfig) {
    // Application overrides
    if let Ok(val) = std::env::var("ROLLCALL_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("ROLLCALL_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }

    // SIS overrides
    if let Ok(val) = std::env::var("ROLLCALL_SIS_BASE_URL") {
        config.sis.base_url = val;
    }
    if let Ok(val) = std::env::var("ROLLCALL_SIS_AUTH_TYPE") {
        config.sis.auth_type = val;
    }
    if let Ok(val) = std::env::var("ROLLCALL_SIS_USERNAME") {
        config.sis.username = Some(val);
    }
    if let Ok(val) = std::env::var("ROLLCALL_SIS_PASSWORD") {
        config.sis.password = Some(crate::config::secret_string(val));
    }
    if let Ok(val) = std::env::var("ROLLCALL_SIS_API_TOKEN") {
        config.sis.api_token = Some(crate::config::secret_string(val));
    }
    if let Ok(val) = std::env::var("ROLLCALL_SIS_TLS_VERIFY") {
        config.sis.tls_verify = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("ROLLCALL_SIS_REQUESTS_PER_MINUTE") {
        if let Ok(limit) = val.parse() {
            config.sis.requests_per_minute = limit;
        }
    }
    if let Ok(val) = std::env::var("ROLLCALL_SIS_MAX_RETRIES") {
        if let Ok(retries) = val.parse() {
            config.sis.retry.max_retries = retries;
        }
    }

    // Sync overrides
    if let Ok(val) = std::env::var("ROLLCALL_SYNC_BATCH_SIZE") {
        if let Ok(size) = val.parse() {
            config.sync.batch_size = size;
        }
    }
    if let Ok(val) = std::env::var("ROLLCALL_SYNC_CHUNK_DAYS") {
        if let Ok(days) = val.parse() {
            config.sync.chunk_days = days;
        }
    }
    if let Ok(val) = std::env::var("ROLLCALL_SYNC_PARALLEL_SCHOOLS") {
        if let Ok(parallel) = val.parse() {
            config.sync.parallel_schools = parallel;
        }
    }

    // Postgres overrides (only if configured)
    if let Some(ref mut postgres) = config.postgres {
        if let Ok(val) = std::env::var("ROLLCALL_POSTGRES_CONNECTION_STRING") {
            postgres.connection_string = val;
        }
        if let Ok(val) = std::env::var("ROLLCALL_POSTGRES_MAX_CONNECTIONS") {
            if let Ok(max) = val.parse() {
                postgres.max_connections = max;
            }
        }
    }

    // Logging overrides
    if let Ok(val) = std::env::var("ROLLCALL_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("ROLLCALL_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
}
