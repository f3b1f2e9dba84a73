//! Domain error types
//!
//! This module defines the error hierarchy for Rollcall. All errors are
//! domain-specific and don't expose third-party types (reqwest, tokio-postgres)
//! to callers.

use std::time::Duration;
use thiserror::Error;

/// Main Rollcall error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum RollcallError {
    /// Configuration-related errors. The only error class that aborts
    /// `execute_sync` synchronously.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// SIS API errors
    #[error("SIS error: {0}")]
    Sis(#[from] SisError),

    /// Retry budget exhausted; carries the total attempt count and the
    /// last error observed.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Circuit breaker rejected the call. Expected back-pressure, not an
    /// operation failure; callers record it and move on.
    #[error("Circuit open for scope '{scope}'")]
    CircuitOpen { scope: String },

    /// Batch write failed; the batch is marked failed and the operation
    /// continues.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Checkpoint load/save errors
    #[error("State error: {0}")]
    State(String),

    /// Record failed validation at the ingestion boundary
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation was cancelled cooperatively
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// SIS API errors
///
/// Errors that occur when talking to the remote Student Information System.
/// Each variant carries the endpoint it arose from so exhausted-retry reports
/// can point at the failing call.
#[derive(Debug, Error)]
pub enum SisError {
    /// Failed to reach the SIS server
    #[error("Failed to connect to SIS at {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    /// Request timed out
    #[error("Request to {endpoint} timed out: {message}")]
    Timeout { endpoint: String, message: String },

    /// The SIS asked us to slow down (HTTP 429)
    #[error("Rate limit exceeded at {endpoint}")]
    RateLimited {
        endpoint: String,
        /// Parsed `Retry-After` header, if the server sent one
        retry_after: Option<Duration>,
    },

    /// Server error (5xx)
    #[error("SIS server error at {endpoint}: {status} - {message}")]
    Server {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// Client error (4xx other than 429) - signals a request-construction bug
    #[error("SIS client error at {endpoint}: {status} - {message}")]
    Client {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("Malformed SIS payload from {endpoint}: {message}")]
    MalformedPayload { endpoint: String, message: String },

    /// Authentication failed
    #[error("SIS authentication failed: {0}")]
    AuthenticationFailed(String),
}

impl SisError {
    /// Whether the retry policy should spend budget on this error.
    ///
    /// This classification is the single source of truth: network faults,
    /// timeouts, 5xx responses and 429s are transient; other 4xx responses
    /// and malformed payloads indicate a bug that retrying cannot fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Server { .. } => true,
            Self::Client { .. } | Self::MalformedPayload { .. } => false,
            Self::AuthenticationFailed(_) => false,
        }
    }

    /// The endpoint this error arose from, where known
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Connection { endpoint, .. }
            | Self::Timeout { endpoint, .. }
            | Self::RateLimited { endpoint, .. }
            | Self::Server { endpoint, .. }
            | Self::Client { endpoint, .. }
            | Self::MalformedPayload { endpoint, .. } => Some(endpoint),
            Self::AuthenticationFailed(_) => None,
        }
    }

    /// Suggested wait before retrying, when the server provided one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl RollcallError {
    /// Whether the error is worth retrying at the request level.
    ///
    /// Delegates to [`SisError::is_retryable`] for SIS errors; a rejected
    /// circuit-breaker call is never retried (the breaker already decided),
    /// and everything else is treated as non-transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Sis(e) => e.is_retryable(),
            _ => false,
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for RollcallError {
    fn from(err: std::io::Error) -> Self {
        RollcallError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for RollcallError {
    fn from(err: serde_json::Error) -> Self {
        RollcallError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for RollcallError {
    fn from(err: toml::de::Error) -> Self {
        RollcallError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error() -> SisError {
        SisError::Server {
            endpoint: "/attendance".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_rollcall_error_display() {
        let err = RollcallError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_sis_error_conversion() {
        let rollcall_err: RollcallError = server_error().into();
        assert!(matches!(rollcall_err, RollcallError::Sis(_)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(server_error().is_retryable());
        assert!(SisError::Connection {
            endpoint: "/attendance".to_string(),
            message: "refused".to_string(),
        }
        .is_retryable());
        assert!(SisError::RateLimited {
            endpoint: "/attendance".to_string(),
            retry_after: Some(Duration::from_secs(5)),
        }
        .is_retryable());

        assert!(!SisError::Client {
            endpoint: "/attendance".to_string(),
            status: 404,
            message: "not found".to_string(),
        }
        .is_retryable());
        assert!(!SisError::MalformedPayload {
            endpoint: "/attendance".to_string(),
            message: "missing records field".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_circuit_open_is_not_retryable() {
        let err = RollcallError::CircuitOpen {
            scope: "SCH001".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retry_after_extraction() {
        let err = SisError::RateLimited {
            endpoint: "/attendance".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(server_error().retry_after(), None);
    }

    #[test]
    fn test_endpoint_extraction() {
        assert_eq!(server_error().endpoint(), Some("/attendance"));
        assert_eq!(
            SisError::AuthenticationFailed("bad token".to_string()).endpoint(),
            None
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let rollcall_err: RollcallError = io_err.into();
        assert!(matches!(rollcall_err, RollcallError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let rollcall_err: RollcallError = json_err.into();
        assert!(matches!(rollcall_err, RollcallError::Serialization(_)));
    }

    #[test]
    fn test_errors_implement_std_error() {
        let err = RollcallError::Validation("Test error".to_string());
        let _: &dyn std::error::Error = &err;

        let err = server_error();
        let _: &dyn std::error::Error = &err;
    }
}
