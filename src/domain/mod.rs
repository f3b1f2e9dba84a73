//! Domain models and types for Rollcall.
//!
//! This module contains the core domain models, types, and business rules.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`SchoolCode`], [`StudentId`], [`OperationId`])
//! - **Attendance model** ([`AttendanceRecord`], [`AttendanceStatus`])
//! - **Error types** ([`RollcallError`], [`SisError`])
//! - **Result type alias** ([`Result`])
//!
//! # Type Safety
//!
//! Rollcall uses the newtype pattern for identifiers to prevent mixing
//! different ID types:
//!
//! ```rust
//! use rollcall::domain::{SchoolCode, StudentId};
//!
//! # fn example() -> Result<(), String> {
//! let school = SchoolCode::new("SCH-042")?;
//! let student = StudentId::new("100042")?;
//!
//! // This won't compile - type safety prevents mixing IDs
//! // let wrong: SchoolCode = student;  // Compile error!
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T>`], which uses
//! [`RollcallError`] as the error type. SIS-facing errors carry an explicit
//! retryable/non-retryable classification consumed by the retry policy.

pub mod attendance;
pub mod errors;
pub mod ids;
pub mod result;

// Re-export commonly used types for convenience
pub use attendance::{AttendanceRecord, AttendanceStatus};
pub use errors::{RollcallError, SisError};
pub use ids::{OperationId, SchoolCode, StudentId};
pub use result::Result;
