//! SIS integration
//!
//! This module provides the rate-limited HTTP client for the district's
//! Student Information System, the wire models it parses, and the sliding
//! window limiter that keeps the client under the SIS vendor's request
//! ceiling.

pub mod client;
pub mod models;
pub mod rate_limit;

pub use client::{BatchError, FetchOptions, FetchOutcome, SisClient};
pub use models::{AttendancePage, RawAttendanceRow};
pub use rate_limit::{RateLimitConfig, RateLimiter};
