use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use shared_browser::{BrowserError, BrowserSession};
use shared_config::PracticeFusionConfig;

use crate::error::ScheduleError;
use crate::models::{
    SchedulePage, APPOINTMENTS_CONTAINER, DATE_PICKER_INPUT, PREVIOUS_DAY_BUTTON, PRINT_BUTTON, PRINT_TABLE,
    SCHEDULE_NAV_LINK,
};
use crate::services::diagnosis::diagnose_page;

const BLANK_PAGE: &str = "about:blank";

/// Captures the print view of the schedule for given dates.
pub struct ScheduleScraper {
    config: PracticeFusionConfig,
    today: NaiveDate,
    debug_dir: Option<PathBuf>,
}

impl ScheduleScraper {
    /// `today` is the date the schedule opens on; only it and earlier
    /// dates can be reached.
    pub fn new(config: PracticeFusionConfig, today: NaiveDate) -> Self {
        Self {
            config,
            today,
            debug_dir: None,
        }
    }

    /// Write every captured page to `dir` as `schedule-<date>.html`.
    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// One page per date, in input order. Dates after today are rejected
    /// before the browser is touched.
    #[instrument(skip(self, browser, dates), fields(count = dates.len()))]
    pub async fn get_schedule_pages(
        &self,
        browser: &dyn BrowserSession,
        dates: &[NaiveDate],
    ) -> Result<Vec<SchedulePage>, ScheduleError> {
        if let Some(&date) = dates.iter().find(|d| **d > self.today) {
            return Err(ScheduleError::FutureDate {
                date,
                today: self.today,
            });
        }

        let mut pages = Vec::with_capacity(dates.len());
        for &date in dates {
            let page = self.get_schedule_page(browser, date).await?;
            if let Some(dir) = &self.debug_dir {
                dump_page(dir, &page).await;
            }
            pages.push(page);
        }
        Ok(pages)
    }

    async fn get_schedule_page(
        &self,
        browser: &dyn BrowserSession,
        date: NaiveDate,
    ) -> Result<SchedulePage, ScheduleError> {
        info!("Capturing schedule for {}", date);

        // Start from a blank page so the schedule opens on today's date
        browser.goto(BLANK_PAGE).await?;
        self.open_schedule(browser, date).await?;

        if browser.accept_alert().await? {
            debug!("Accepted a pending dialog");
        }

        self.set_date(browser, date).await?;

        if let Err(e) = browser.wait_for(APPOINTMENTS_CONTAINER, self.config.wait_timeout).await {
            return Err(self.classify(browser, e, "appointments container", date).await);
        }

        self.open_print_view(browser, date).await?;

        let html = browser.page_source().await?;
        debug!("Captured {} bytes for {}", html.len(), date);
        Ok(SchedulePage {
            target_date: date,
            html,
        })
    }

    async fn open_schedule(&self, browser: &dyn BrowserSession, date: NaiveDate) -> Result<(), ScheduleError> {
        browser.goto(&self.config.schedule_url()).await?;
        self.ensure_session(browser, "opening the schedule").await?;

        let attempts = self.config.navigation_attempts.max(1);
        for attempt in 1..=attempts {
            match browser.wait_for(APPOINTMENTS_CONTAINER, self.config.wait_timeout).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    self.ensure_session(browser, "opening the schedule").await?;
                    warn!(
                        "Schedule did not load (attempt {}/{}): {}; navigating through the menu",
                        attempt, attempts, e
                    );
                    if browser.is_present(SCHEDULE_NAV_LINK).await? {
                        browser.click(SCHEDULE_NAV_LINK).await?;
                    } else {
                        browser.goto(&self.config.schedule_url()).await?;
                    }
                    sleep(self.config.page_settle_delay).await;
                }
                Err(e) => return Err(self.classify(browser, e, "schedule page", date).await),
            }
        }
        Ok(())
    }

    /// Prefers typing into the date picker; otherwise steps back one day at
    /// a time from today.
    async fn set_date(&self, browser: &dyn BrowserSession, date: NaiveDate) -> Result<(), ScheduleError> {
        let days_back = (self.today - date).num_days();
        if days_back < 0 {
            return Err(ScheduleError::FutureDate {
                date,
                today: self.today,
            });
        }
        if days_back == 0 {
            return Ok(());
        }

        if browser.is_present(DATE_PICKER_INPUT).await? {
            debug!("Entering {} in the date picker", date);
            browser
                .fill(DATE_PICKER_INPUT, &date.format("%m/%d/%Y").to_string())
                .await?;
            browser.press_enter(DATE_PICKER_INPUT).await?;
            sleep(self.config.page_settle_delay).await;
            return Ok(());
        }

        info!("Going back {} days to reach {}", days_back, date);
        sleep(self.config.page_settle_delay).await;
        for _ in 0..days_back {
            if let Err(e) = browser.wait_for(PREVIOUS_DAY_BUTTON, self.config.wait_timeout).await {
                return Err(self.classify(browser, e, "previous day control", date).await);
            }
            browser.click(PREVIOUS_DAY_BUTTON).await?;
            sleep(self.config.day_step_delay).await;
        }
        Ok(())
    }

    async fn open_print_view(&self, browser: &dyn BrowserSession, date: NaiveDate) -> Result<(), ScheduleError> {
        let attempts = self.config.print_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let result = async {
                browser.wait_for(PRINT_BUTTON, self.config.wait_timeout).await?;
                browser.click(PRINT_BUTTON).await?;
                browser.wait_for(PRINT_TABLE, self.config.wait_timeout).await
            }
            .await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_timeout() => {
                    self.ensure_session(browser, "opening the print view").await?;
                    warn!("Print view not ready (attempt {}/{}): {}", attempt, attempts, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(self.classify(browser, e, "print view", date).await),
            }
        }

        let error = last_error.unwrap_or_else(|| BrowserError::timeout(PRINT_TABLE, self.config.wait_timeout));
        Err(self.classify(browser, error, "print view", date).await)
    }

    async fn ensure_session(&self, browser: &dyn BrowserSession, during: &str) -> Result<(), ScheduleError> {
        let url = browser.current_url().await?;
        if url.contains(&self.config.login_route) {
            warn!("Redirected to login while {}", during);
            return Err(ScheduleError::SessionExpired {
                during: during.to_string(),
            });
        }
        Ok(())
    }

    /// Maps a failed wait to session expiry, timeout or a plain browser error.
    async fn classify(
        &self,
        browser: &dyn BrowserSession,
        error: BrowserError,
        what: &str,
        date: NaiveDate,
    ) -> ScheduleError {
        if let Err(expired) = self.ensure_session(browser, &format!("waiting for {}", what)).await {
            return expired;
        }

        if let Ok(html) = browser.page_source().await {
            let diagnosis = diagnose_page(&html);
            if diagnosis.is_login_page {
                return ScheduleError::SessionExpired {
                    during: format!("waiting for {}", what),
                };
            }
            warn!("Page while waiting for {}: {}", what, diagnosis);
        }

        match error {
            BrowserError::Timeout { .. } => ScheduleError::Timeout {
                what: what.to_string(),
                date,
            },
            other => ScheduleError::Browser(other),
        }
    }
}

async fn dump_page(dir: &Path, page: &SchedulePage) {
    let path = dir.join(format!("schedule-{}.html", page.target_date.format("%Y-%m-%d")));
    let result = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, page.html.as_bytes()).await
    }
    .await;

    match result {
        Ok(()) => debug!("Wrote schedule HTML to {}", path.display()),
        Err(e) => warn!("Could not write schedule HTML to {}: {}", path.display(), e),
    }
}
