// Rollcall - SIS attendance sync engine
// Copyright (c) 2025 Rollcall Contributors
// Licensed under the MIT License

//! # Rollcall - SIS attendance sync engine
//!
//! Rollcall pulls student attendance data from a district's Student
//! Information System (SIS) REST API into a local PostgreSQL store. It is
//! built for multi-month backfills against flaky vendor APIs: requests are
//! rate limited, retried with exponential backoff, and shed through
//! per-school circuit breakers; work is chunked, batched, checkpointed and
//! resumable; one bad batch never loses a day's sync.
//!
//! ## Architecture
//!
//! Rollcall follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`sync`] - Orchestration core (planner, operation state, orchestrator)
//! - [`sis`] - Rate-limited SIS API client and wire models
//! - [`resilience`] - Retry policy and circuit breakers
//! - [`persistence`] - Gateway trait with PostgreSQL and in-memory backends
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`audit`] - Injected audit sink
//! - [`logging`] - Structured logging bootstrap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rollcall::cli::commands::sync::build_orchestrator;
//! use rollcall::config::load_config;
//! use rollcall::sync::operation::{DateRange, SyncKind};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = load_config("rollcall.toml")?;
//! let range = DateRange {
//!     start: chrono::NaiveDate::from_ymd_opt(2024, 8, 15).unwrap(),
//!     end: chrono::NaiveDate::from_ymd_opt(2024, 11, 2).unwrap(),
//! };
//!
//! let orchestrator =
//!     build_orchestrator(&config, SyncKind::Full, range, CancellationToken::new()).await?;
//! let report = orchestrator.execute_sync().await?;
//!
//! println!("Processed {} records", report.records_processed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Resumability
//!
//! The orchestrator checkpoints the operation document every few batches.
//! After a crash, `rollcall resume --operation-id <id> --from-batch <n>`
//! re-enters the same plan and skips the batches already persisted; the
//! gateway's keyed upsert makes any overlap idempotent.
//!
//! ## Error Handling
//!
//! All fallible operations return [`domain::Result`]. SIS errors carry an
//! explicit retryable/non-retryable classification; only configuration
//! errors abort a sync synchronously - everything else is recorded in the
//! final [`sync::SyncReport`].

pub mod audit;
pub mod cli;
pub mod config;
pub mod domain;
pub mod logging;
pub mod persistence;
pub mod resilience;
pub mod sis;
pub mod sync;
