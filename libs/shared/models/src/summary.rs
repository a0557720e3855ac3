use chrono::NaiveDate;
use serde::Serialize;

/// Outcome of persisting a batch of scraped appointments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub created: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// Outcome of dispatching surveys for pending records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SurveySummary {
    pub pending: usize,
    pub sent: usize,
    pub dispatch_errors: usize,
    pub update_errors: usize,
}

/// Counts reported at the end of a run. Recoverable failures end up here
/// instead of aborting the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dates: Vec<NaiveDate>,
    pub retrieved: usize,
    pub after_filter: usize,
    pub parse_failures: usize,
    pub ingest: IngestSummary,
    pub surveys: Option<SurveySummary>,
}

impl RunSummary {
    pub fn error_count(&self) -> usize {
        let survey_errors = self
            .surveys
            .as_ref()
            .map(|s| s.dispatch_errors + s.update_errors)
            .unwrap_or(0);
        self.parse_failures + self.ingest.errors + survey_errors
    }
}
