//! Logging and observability
//!
//! Structured logging built on `tracing`: console output always, optional
//! JSON file logs with rotation. Compliance-oriented events go through the
//! injected [`crate::audit::AuditSink`] instead of this module.

pub mod structured;

pub use structured::{init_logging, LoggingGuard};
