//! Chunked date-range planning
//!
//! Splits a requested sync range into bounded sub-ranges so no single remote
//! query's result set grows with the overall range. The decomposition is
//! deterministic: identical inputs always produce identical chunk boundaries,
//! which is what makes resuming an operation reproduce the original batch
//! numbering.

use crate::domain::{Result, RollcallError};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// A bounded, inclusive sub-interval of the overall sync range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateChunk {
    /// First day of the chunk (inclusive)
    pub start: NaiveDate,
    /// Last day of the chunk (inclusive)
    pub end: NaiveDate,
    /// Position within the parent operation's plan
    pub index: usize,
}

impl DateChunk {
    /// Number of calendar days covered, boundaries included
    pub fn days(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }
}

/// Decompose `[start, end]` into ordered chunks of at most `chunk_days` days.
///
/// The chunks are contiguous, non-overlapping and boundary-inclusive; their
/// union is exactly the input range.
///
/// # Errors
///
/// Returns [`RollcallError::Configuration`] when the range is inverted or
/// `chunk_days` is zero; both are caller bugs detected before any work
/// starts.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use rollcall::sync::planner::plan_chunks;
///
/// let start = NaiveDate::from_ymd_opt(2024, 8, 15).unwrap();
/// let end = NaiveDate::from_ymd_opt(2024, 8, 17).unwrap();
///
/// let chunks = plan_chunks(start, end, 1).unwrap();
/// assert_eq!(chunks.len(), 3);
/// assert_eq!(chunks[0].start, chunks[0].end);
/// ```
pub fn plan_chunks(start: NaiveDate, end: NaiveDate, chunk_days: u32) -> Result<Vec<DateChunk>> {
    if chunk_days == 0 {
        return Err(RollcallError::Configuration(
            "chunk_days must be at least 1".to_string(),
        ));
    }
    if start > end {
        return Err(RollcallError::Configuration(format!(
            "Invalid date range: start {start} is after end {end}"
        )));
    }

    let mut chunks = Vec::new();
    let mut chunk_start = start;
    let mut index = 0;

    while chunk_start <= end {
        let chunk_end = chunk_start
            .checked_add_days(Days::new(u64::from(chunk_days) - 1))
            .map(|d| d.min(end))
            .unwrap_or(end);

        chunks.push(DateChunk {
            start: chunk_start,
            end: chunk_end,
            index,
        });

        chunk_start = match chunk_end.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
        index += 1;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_day_range() {
        let chunks = plan_chunks(date(2024, 8, 15), date(2024, 8, 15), 30).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, date(2024, 8, 15));
        assert_eq!(chunks[0].end, date(2024, 8, 15));
        assert_eq!(chunks[0].days(), 1);
    }

    #[test]
    fn test_three_days_daily_chunks() {
        let chunks = plan_chunks(date(2024, 8, 15), date(2024, 8, 17), 1).unwrap();
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.start, chunk.end);
        }
    }

    #[test]
    fn test_uneven_final_chunk() {
        // 10 days in chunks of 7: one full chunk, one 3-day remainder
        let chunks = plan_chunks(date(2024, 9, 1), date(2024, 9, 10), 7).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].days(), 7);
        assert_eq!(chunks[1].days(), 3);
        assert_eq!(chunks[1].end, date(2024, 9, 10));
    }

    #[test_case(1; "daily")]
    #[test_case(7; "weekly")]
    #[test_case(30; "monthly")]
    #[test_case(365; "wider than range")]
    fn test_chunks_cover_range_exactly(chunk_days: u32) {
        let start = date(2024, 8, 15);
        let end = date(2024, 11, 2);
        let chunks = plan_chunks(start, end, chunk_days).unwrap();

        // Contiguous, non-overlapping, union equals the range
        assert_eq!(chunks.first().unwrap().start, start);
        assert_eq!(chunks.last().unwrap().end, end);
        for pair in chunks.windows(2) {
            assert_eq!(
                pair[0].end.checked_add_days(Days::new(1)).unwrap(),
                pair[1].start
            );
        }
        for chunk in &chunks {
            assert!(chunk.start <= chunk.end);
            assert!(chunk.days() <= u64::from(chunk_days));
        }
        let total_days: u64 = chunks.iter().map(DateChunk::days).sum();
        assert_eq!(total_days, (end - start).num_days() as u64 + 1);
    }

    #[test]
    fn test_deterministic() {
        let a = plan_chunks(date(2024, 1, 1), date(2024, 6, 30), 30).unwrap();
        let b = plan_chunks(date(2024, 1, 1), date(2024, 6, 30), 30).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = plan_chunks(date(2024, 8, 17), date(2024, 8, 15), 30).unwrap_err();
        assert!(matches!(err, RollcallError::Configuration(_)));
    }

    #[test]
    fn test_zero_chunk_days_rejected() {
        let err = plan_chunks(date(2024, 8, 15), date(2024, 8, 17), 0).unwrap_err();
        assert!(matches!(err, RollcallError::Configuration(_)));
    }

    #[test]
    fn test_leap_day_handling() {
        let chunks = plan_chunks(date(2024, 2, 28), date(2024, 3, 1), 1).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].start, date(2024, 2, 29));
    }
}
