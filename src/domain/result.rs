//! Result type alias for Rollcall
//!
//! This module provides a convenient Result type alias that uses RollcallError
//! as the error type.

use super::errors::RollcallError;

/// Result type alias for Rollcall operations
///
/// This is a convenience type alias that uses `RollcallError` as the error
/// type. Use this throughout the codebase for fallible operations.
///
/// # Examples
///
/// ```
/// use rollcall::domain::result::Result;
/// use rollcall::domain::errors::RollcallError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(RollcallError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, RollcallError>;
