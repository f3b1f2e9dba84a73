//! SIS wire models
//!
//! Raw shapes returned by the SIS attendance endpoint, kept separate from the
//! validated domain types. Conversion happens once per row in
//! [`RawAttendanceRow::into_record`]; rows that fail validation are
//! quarantined with a descriptive reason rather than coerced.

use crate::domain::{AttendanceRecord, AttendanceStatus, SchoolCode, StudentId};
use chrono::NaiveDate;
use serde::Deserialize;
use std::str::FromStr;

/// One attendance row as the SIS returns it
///
/// Every field is optional at the wire level; presence and format are
/// enforced during conversion.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAttendanceRow {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub school_code: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub minutes_absent: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl RawAttendanceRow {
    /// Validate the row into a domain record.
    ///
    /// `query_school` is the school the page was requested for; it fills in
    /// when the SIS omits the per-row school code.
    pub fn into_record(self, query_school: &SchoolCode) -> Result<AttendanceRecord, String> {
        let student_id = self
            .student_id
            .as_deref()
            .ok_or_else(|| "missing student_id".to_string())
            .and_then(StudentId::new)?;

        let date_str = self.date.as_deref().ok_or_else(|| {
            format!("missing date for student {}", student_id.as_str())
        })?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
            format!(
                "unparseable date '{date_str}' for student {}: {e}",
                student_id.as_str()
            )
        })?;

        let status_str = self.status.as_deref().ok_or_else(|| {
            format!("missing status for student {} on {date}", student_id.as_str())
        })?;
        let status = AttendanceStatus::from_str(status_str).map_err(|e| {
            format!("student {} on {date}: {e}", student_id.as_str())
        })?;

        let school_code = match self.school_code {
            Some(code) => SchoolCode::new(code)?,
            None => query_school.clone(),
        };

        let minutes_absent = match self.minutes_absent {
            Some(m) if m < 0 => {
                return Err(format!(
                    "negative minutes_absent ({m}) for student {} on {date}",
                    student_id.as_str()
                ));
            }
            Some(m) => Some(m as u32),
            None => None,
        };

        Ok(AttendanceRecord {
            student_id,
            school_code,
            date,
            status,
            minutes_absent,
            comment: self.comment,
        })
    }
}

/// One page of the paged attendance endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AttendancePage {
    /// Rows on this page
    pub records: Vec<RawAttendanceRow>,
    /// 1-based page number
    pub page: u32,
    /// Total pages for the query
    pub total_pages: u32,
    /// Total matching records, when the SIS reports it
    #[serde(default)]
    pub total_records: Option<u64>,
}

impl AttendancePage {
    /// Whether another page follows this one
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn school() -> SchoolCode {
        SchoolCode::new("SCH-01").unwrap()
    }

    fn valid_row() -> RawAttendanceRow {
        RawAttendanceRow {
            student_id: Some("100042".to_string()),
            school_code: Some("SCH-01".to_string()),
            date: Some("2024-08-15".to_string()),
            status: Some("P".to_string()),
            minutes_absent: None,
            comment: None,
        }
    }

    #[test]
    fn test_valid_row_converts() {
        let record = valid_row().into_record(&school()).unwrap();
        assert_eq!(record.student_id.as_str(), "100042");
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 8, 15).unwrap());
    }

    #[test]
    fn test_missing_school_falls_back_to_query_school() {
        let mut row = valid_row();
        row.school_code = None;
        let record = row.into_record(&school()).unwrap();
        assert_eq!(record.school_code, school());
    }

    #[test]
    fn test_missing_student_id_rejected() {
        let mut row = valid_row();
        row.student_id = None;
        let err = row.into_record(&school()).unwrap_err();
        assert!(err.contains("missing student_id"));
    }

    #[test]
    fn test_bad_date_rejected() {
        let mut row = valid_row();
        row.date = Some("08/15/2024".to_string());
        let err = row.into_record(&school()).unwrap_err();
        assert!(err.contains("unparseable date"));
    }

    #[test]
    fn test_unknown_status_rejected_not_defaulted() {
        let mut row = valid_row();
        row.status = Some("Z".to_string());
        let err = row.into_record(&school()).unwrap_err();
        assert!(err.contains("Unknown attendance status"));
    }

    #[test]
    fn test_negative_minutes_rejected_not_zeroed() {
        let mut row = valid_row();
        row.minutes_absent = Some(-30);
        let err = row.into_record(&school()).unwrap_err();
        assert!(err.contains("negative minutes_absent"));
    }

    #[test]
    fn test_page_pagination() {
        let page = AttendancePage {
            records: Vec::new(),
            page: 1,
            total_pages: 3,
            total_records: Some(75),
        };
        assert!(page.has_next());

        let last = AttendancePage {
            records: Vec::new(),
            page: 3,
            total_pages: 3,
            total_records: Some(75),
        };
        assert!(!last.has_next());
    }

    #[test]
    fn test_page_deserializes_from_json() {
        let json = r#"{
            "records": [
                {"student_id": "1", "date": "2024-08-15", "status": "A"},
                {"student_id": "2", "date": "2024-08-15", "status": "present", "minutes_absent": 0}
            ],
            "page": 1,
            "total_pages": 1,
            "total_records": 2
        }"#;

        let page: AttendancePage = serde_json::from_str(json).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total_records, Some(2));
    }
}
