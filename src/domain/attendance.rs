//! Attendance domain model
//!
//! This module defines the validated attendance record type and its status
//! enumeration. Validation happens once, at the ingestion boundary: rows that
//! fail to parse are quarantined into the batch's error list rather than
//! coerced to defaults, so data-quality problems surface in the sync report
//! instead of silently becoming zeros.

use crate::domain::ids::{SchoolCode, StudentId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Daily attendance status for one student
///
/// Parsed from the status codes SIS vendors commonly emit; anything
/// unrecognized is a validation error, never a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    /// Student was present for the full day
    Present,
    /// Absence without a recorded excuse
    Absent,
    /// Late arrival
    Tardy,
    /// Excused absence (medical, family, school activity)
    Excused,
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P" | "PRESENT" => Ok(Self::Present),
            "A" | "ABSENT" | "UNEXCUSED" => Ok(Self::Absent),
            "T" | "TARDY" | "LATE" => Ok(Self::Tardy),
            "E" | "EXCUSED" | "EXCUSED_ABSENCE" => Ok(Self::Excused),
            other => Err(format!("Unknown attendance status code: '{other}'")),
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Tardy => "tardy",
            Self::Excused => "excused",
        };
        write!(f, "{s}")
    }
}

impl AttendanceStatus {
    /// Whether this status counts against the student's attendance rate
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::Absent | Self::Excused)
    }
}

/// One validated attendance row
///
/// The `(student_id, date)` pair is the natural key the persistence gateway
/// upserts on; replaying a batch after a crash cannot duplicate rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// District-assigned student identifier
    pub student_id: StudentId,

    /// School the record was reported by
    pub school_code: SchoolCode,

    /// Calendar date the record applies to
    pub date: NaiveDate,

    /// Attendance status for the day
    pub status: AttendanceStatus,

    /// Minutes of instruction missed, if the SIS reports them
    pub minutes_absent: Option<u32>,

    /// Free-form comment carried through from the SIS
    pub comment: Option<String>,
}

impl AttendanceRecord {
    /// Natural key for idempotent upserts
    pub fn natural_key(&self) -> (&StudentId, NaiveDate) {
        (&self.student_id, self.date)
    }
}
