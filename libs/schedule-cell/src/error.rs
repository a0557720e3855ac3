use chrono::NaiveDate;
use thiserror::Error;

use shared_browser::BrowserError;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("EHR session expired while {during}")]
    SessionExpired { during: String },

    #[error("Timed out waiting for {what} on the schedule for {date}")]
    Timeout { what: String, date: NaiveDate },

    #[error("Cannot scrape {date}: it is after today ({today})")]
    FutureDate { date: NaiveDate, today: NaiveDate },

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),
}

impl ScheduleError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ScheduleError::SessionExpired { .. })
    }
}

/// Page-level parse failures. Row-level problems are skipped, not raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Schedule heading with a date was not found")]
    MissingHeading,

    #[error("Could not read schedule date from heading '{0}'")]
    InvalidHeadingDate(String),

    #[error("Page shows the schedule for {found}, expected {expected}")]
    DateMismatch { expected: NaiveDate, found: NaiveDate },

    #[error("Invalid selector '{0}'")]
    Selector(String),
}
