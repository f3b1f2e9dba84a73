//! Domain identifier types with validation
//!
//! This module provides newtype wrappers for the identifiers Rollcall works
//! with. Each type ensures type safety and validates format at construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// School code newtype wrapper
///
/// Identifies one school within a district. School codes are the unit of
/// circuit-breaker isolation: one failing school must not block the others.
///
/// # Examples
///
/// ```
/// use rollcall::domain::ids::SchoolCode;
/// use std::str::FromStr;
///
/// let school = SchoolCode::from_str("SCH-042").unwrap();
/// assert_eq!(school.as_str(), "SCH-042");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchoolCode(String);

impl SchoolCode {
    /// Creates a new SchoolCode from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(SchoolCode)` if the code is valid, `Err` otherwise
    pub fn new(code: impl Into<String>) -> Result<Self, String> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err("School code cannot be empty".to_string());
        }
        if code.chars().any(char::is_whitespace) {
            return Err(format!("School code cannot contain whitespace: '{code}'"));
        }
        Ok(Self(code))
    }

    /// Returns the school code as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SchoolCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SchoolCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SchoolCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Student identifier newtype wrapper
///
/// The district-assigned student number. Together with the attendance date it
/// forms the natural key attendance rows are upserted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(String);

impl StudentId {
    /// Creates a new StudentId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Student ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the student ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StudentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for StudentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sync operation identifier newtype wrapper
///
/// An opaque identifier for one invocation of the sync engine. Generated
/// fresh for new operations, supplied by the caller on resume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(String);

impl OperationId {
    /// Generates a new random operation ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an OperationId from an existing string (e.g. when resuming)
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Operation ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the operation ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for OperationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
