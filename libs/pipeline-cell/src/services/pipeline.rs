use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};

use appointment_cell::{filter_for_survey, AppointmentRegistry};
use schedule_cell::{parse_schedule, ParseError, SchedulePage, ScheduleError, ScheduleScraper};
use session_cell::{EhrSessionManager, SessionMode};
use shared_browser::{BrowserLauncher, BrowserSession};
use shared_models::{Appointment, RunSummary, SurveyTarget};
use survey_cell::SurveyCampaign;

use crate::error::PipelineError;
use crate::models::RunOptions;

/// Scrape, persist and survey for a set of schedule dates.
pub struct SurveyPipeline {
    launcher: Arc<dyn BrowserLauncher>,
    session: EhrSessionManager,
    scraper: ScheduleScraper,
    registry: AppointmentRegistry,
    campaign: Option<SurveyCampaign>,
    target: SurveyTarget,
}

impl SurveyPipeline {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        session: EhrSessionManager,
        scraper: ScheduleScraper,
        registry: AppointmentRegistry,
        campaign: Option<SurveyCampaign>,
        target: SurveyTarget,
    ) -> Self {
        Self {
            launcher,
            session,
            scraper,
            registry,
            campaign,
            target,
        }
    }

    /// A scrape failure aborts the run before anything is stored.
    /// Page, record and dispatch failures are counted in the summary.
    #[instrument(skip(self, dates), fields(dates = dates.len()))]
    pub async fn run(&self, dates: &[NaiveDate], options: RunOptions) -> Result<RunSummary, PipelineError> {
        if options.send_surveys && self.campaign.is_none() {
            return Err(PipelineError::SurveysNotConfigured);
        }

        let mut summary = RunSummary {
            dates: dates.to_vec(),
            ..Default::default()
        };

        let pages = self.collect(dates).await?;

        let mut appointments = Vec::new();
        for page in &pages {
            match parse_page(page) {
                Ok(parsed) => {
                    info!("{}: {} appointments", page.target_date, parsed.len());
                    appointments.extend(parsed);
                }
                Err(e) => {
                    warn!("Skipping schedule for {}: {}", page.target_date, e);
                    summary.parse_failures += 1;
                }
            }
        }
        summary.retrieved = appointments.len();

        let selected = filter_for_survey(appointments, &self.target);
        summary.after_filter = selected.len();
        info!("{} of {} appointments qualify for a survey", summary.after_filter, summary.retrieved);

        summary.ingest = self.registry.ingest(selected).await;

        match (&self.campaign, options.send_surveys) {
            (Some(campaign), true) => summary.surveys = Some(campaign.send_pending().await?),
            _ => info!("Survey dispatch skipped"),
        }

        Ok(summary)
    }

    /// Captures every page in one authenticated browser. A session that
    /// expires mid-scrape gets its cached state dropped and exactly one
    /// retry with a fresh login.
    pub async fn collect(&self, dates: &[NaiveDate]) -> Result<Vec<SchedulePage>, PipelineError> {
        match self.collect_once(dates, SessionMode::ReuseCached).await {
            Err(PipelineError::Scrape(ScheduleError::SessionExpired { during })) => {
                warn!("EHR session expired while {}; retrying with a fresh login", during);
                if let Err(e) = self.session.invalidate().await {
                    warn!("Could not clear cached EHR session: {}", e);
                }
                match self.collect_once(dates, SessionMode::ForceLogin).await {
                    Err(PipelineError::Scrape(ScheduleError::SessionExpired { .. })) => {
                        Err(PipelineError::SessionExpiredAfterRetry)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn collect_once(&self, dates: &[NaiveDate], mode: SessionMode) -> Result<Vec<SchedulePage>, PipelineError> {
        let browser = self.launcher.launch().await?;
        let result = self.scrape_with(browser.as_ref(), dates, mode).await;

        if let Err(e) = browser.close().await {
            error!("Failed to close EHR browser: {}", e);
        }
        result
    }

    async fn scrape_with(
        &self,
        browser: &dyn BrowserSession,
        dates: &[NaiveDate],
        mode: SessionMode,
    ) -> Result<Vec<SchedulePage>, PipelineError> {
        self.session.establish(browser, mode).await?;
        Ok(self.scraper.get_schedule_pages(browser, dates).await?)
    }
}

/// Parses a captured page, rejecting one that shows a different day.
pub fn parse_page(page: &SchedulePage) -> Result<Vec<Appointment>, ParseError> {
    let schedule = parse_schedule(&page.html)?;
    if schedule.schedule_date != page.target_date {
        return Err(ParseError::DateMismatch {
            expected: page.target_date,
            found: schedule.schedule_date,
        });
    }
    Ok(schedule.appointments)
}
