use chrono::NaiveDate;

use crate::error::PipelineError;

/// Which stages a run executes after the schedule has been scraped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub send_surveys: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { send_surveys: true }
    }
}

/// Every date from `start` to `end`, both inclusive.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, PipelineError> {
    if start > end {
        return Err(PipelineError::InvalidRange { start, end });
    }
    Ok(start.iter_days().take_while(|d| *d <= end).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn test_range_is_inclusive() {
        assert_eq!(date_range(day(1), day(3)).unwrap(), vec![day(1), day(2), day(3)]);
        assert_eq!(date_range(day(2), day(2)).unwrap(), vec![day(2)]);
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        assert_matches!(date_range(day(3), day(1)), Err(PipelineError::InvalidRange { .. }));
    }
}
