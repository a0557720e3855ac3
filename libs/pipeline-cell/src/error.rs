use thiserror::Error;

use appointment_cell::StoreError;
use schedule_cell::ScheduleError;
use session_cell::SessionError;
use shared_browser::BrowserError;

/// Failures that end a run before anything is persisted, or that stop
/// the survey phase from starting.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] SessionError),

    #[error("Scrape failed: {0}")]
    Scrape(#[from] ScheduleError),

    #[error("EHR session expired again after a fresh login")]
    SessionExpiredAfterRetry,

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Survey dispatch requested but no messaging provider is configured")]
    SurveysNotConfigured,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Start date {start} is after end date {end}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
}
