// libs/pipeline-cell/tests/pipeline_test.rs

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::NaiveDate;

use appointment_cell::{AppointmentRegistry, AppointmentStore, InMemoryAppointmentStore, PendingSurveyQuery};
use pipeline_cell::{PipelineError, RunOptions, SurveyPipeline};
use schedule_cell::{ScheduleError, ScheduleScraper, APPOINTMENTS_CONTAINER, PREVIOUS_DAY_BUTTON, PRINT_BUTTON, PRINT_TABLE};
use session_cell::ehr::{LOGIN_BUTTON, PASSWORD_INPUT, USERNAME_INPUT};
use session_cell::{EhrSessionManager, InMemorySessionStateStore, MfaCodeSource, SessionError, EHR_SITE};
use shared_browser::fake::{ClickEffect, FakeBrowser, FakeLauncher, FakePage};
use shared_config::PracticeFusionConfig;
use shared_models::{IngestSummary, SurveyTarget};
use shared_utils::test_utils::{print_schedule_page, FixtureRow, TestConfig};
use shared_utils::RetryPolicy;
use survey_cell::{DispatchError, MessagingProvider, SmsMessage, SurveyCampaign, SurveyDispatcher};

struct NoCode;

#[async_trait]
impl MfaCodeSource for NoCode {
    async fn latest_code(&self) -> Result<String, SessionError> {
        Err(SessionError::MfaCodeNotFound {
            waited: std::time::Duration::ZERO,
        })
    }
}

#[derive(Default)]
struct RecordingProvider {
    sent: Mutex<Vec<SmsMessage>>,
}

#[async_trait]
impl MessagingProvider for RecordingProvider {
    async fn send(&self, message: &SmsMessage) -> Result<String, DispatchError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(format!("SM{}", sent.len()))
    }
}

fn jan(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
}

fn page_for(date: NaiveDate, rows: &[FixtureRow]) -> String {
    print_schedule_page(&date.format("%A, %B, %d, %Y").to_string(), rows)
}

fn jane() -> FixtureRow {
    FixtureRow::seen("DOE JANE", "10:30 AM")
}

/// EHR whose login form signs straight in, without a security check.
fn ehr_browser(config: &PracticeFusionConfig, pages: Vec<String>) -> FakeBrowser {
    FakeBrowser::new(vec![
        FakePage::new("about:blank"),
        FakePage::new("#/login").with_selectors(&[USERNAME_INPUT, PASSWORD_INPUT, LOGIN_BUTTON]),
        FakePage::new("#/PF/")
            .requiring_auth()
            .with_selectors(&[APPOINTMENTS_CONTAINER, PREVIOUS_DAY_BUTTON, PRINT_BUTTON]),
    ])
    .with_login_redirect(&config.login_url())
    .on_click(
        LOGIN_BUTTON,
        vec![
            ClickEffect::Authenticate,
            ClickEffect::Navigate(format!("{}#/PF/home", config.base_url)),
        ],
    )
    .on_click(PRINT_BUTTON, vec![ClickEffect::Reveal(PRINT_TABLE.to_string()), ClickEffect::NextSource])
    .with_source_queue(pages)
}

struct Harness {
    pipeline: SurveyPipeline,
    store: Arc<InMemoryAppointmentStore>,
    sessions: Arc<InMemorySessionStateStore>,
    provider: Arc<RecordingProvider>,
}

fn harness(browsers: Vec<FakeBrowser>, sessions: InMemorySessionStateStore, today: NaiveDate) -> Harness {
    let config = TestConfig::default();
    let sessions = Arc::new(sessions);
    let store = Arc::new(InMemoryAppointmentStore::new());
    let provider = Arc::new(RecordingProvider::default());

    let session = EhrSessionManager::new(config.practice_fusion(), sessions.clone(), Arc::new(NoCode))
        .with_code_retry(RetryPolicy::once());
    let scraper = ScheduleScraper::new(config.practice_fusion(), today);
    let registry = AppointmentRegistry::new(store.clone());
    let dispatcher = SurveyDispatcher::new(&config.twilio(), provider.clone());
    let campaign = SurveyCampaign::new(store.clone(), dispatcher, PendingSurveyQuery::default());

    let pipeline = SurveyPipeline::new(
        Arc::new(FakeLauncher::new(browsers)),
        session,
        scraper,
        registry,
        Some(campaign),
        SurveyTarget::default(),
    );

    Harness {
        pipeline,
        store,
        sessions,
        provider,
    }
}

#[tokio::test]
async fn test_run_stores_and_surveys_seen_visits() {
    let config = TestConfig::default().practice_fusion();
    let rows = [
        jane(),
        FixtureRow::seen("ROE RICK", "11:00 AM").with_status("No Show"),
        FixtureRow::seen("POE PAM", "1:15 PM").with_kind("INTAKE"),
    ];
    let browser = ehr_browser(&config, vec![page_for(jan(2), &rows)]);
    let h = harness(vec![browser.clone()], InMemorySessionStateStore::new(), jan(2));

    let summary = h.pipeline.run(&[jan(2)], RunOptions::default()).await.unwrap();

    assert_eq!(summary.retrieved, 3);
    assert_eq!(summary.after_filter, 1);
    assert_eq!(summary.ingest, IngestSummary { created: 1, duplicates: 0, errors: 0 });
    let surveys = summary.surveys.clone().unwrap();
    assert_eq!((surveys.pending, surveys.sent), (1, 1));
    assert_eq!(summary.error_count(), 0);

    let sent = h.provider.sent.lock().unwrap();
    assert_eq!(sent[0].to, "+15551234567");
    assert!(sent[0].body.starts_with("Hi Doe Jane,"));
    assert!(browser.is_closed());
    assert!(h.sessions.contains(EHR_SITE));
    assert!(h.store.records().iter().all(|r| r.survey_sent()));
}

#[tokio::test]
async fn test_second_run_over_same_day_is_idempotent() {
    let config = TestConfig::default().practice_fusion();
    let first = ehr_browser(&config, vec![page_for(jan(2), &[jane()])]);
    let second = ehr_browser(&config, vec![page_for(jan(2), &[jane()])]);
    let h = harness(vec![first, second], InMemorySessionStateStore::new(), jan(2));

    h.pipeline.run(&[jan(2)], RunOptions::default()).await.unwrap();
    let again = h.pipeline.run(&[jan(2)], RunOptions::default()).await.unwrap();

    assert_eq!(again.ingest, IngestSummary { created: 0, duplicates: 1, errors: 0 });
    assert_eq!(again.surveys.unwrap().pending, 0);
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.provider.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_expired_session_is_retried_once_with_fresh_login() {
    let config = TestConfig::default().practice_fusion();
    // Visits: schedule (cache check), blank, schedule -> expired
    let stale = ehr_browser(&config, vec![]).expire_session_at_visit(3);
    let fresh = ehr_browser(&config, vec![page_for(jan(2), &[jane()])]);
    let sessions = InMemorySessionStateStore::with_state(EHR_SITE, FakeBrowser::authenticated_state());
    let h = harness(vec![stale.clone(), fresh.clone()], sessions, jan(2));

    let summary = h.pipeline.run(&[jan(2)], RunOptions::default()).await.unwrap();

    assert_eq!(summary.ingest.created, 1);
    assert!(stale.fills().is_empty());
    assert!(fresh.fills().contains(&(USERNAME_INPUT.to_string(), "pf-user".to_string())));
    assert!(stale.is_closed());
    assert!(fresh.is_closed());
    assert!(h.sessions.contains(EHR_SITE));
}

#[tokio::test]
async fn test_second_expiry_aborts_without_persisting() {
    let config = TestConfig::default().practice_fusion();
    let sessions = InMemorySessionStateStore::with_state(EHR_SITE, FakeBrowser::authenticated_state());
    let stale = ehr_browser(&config, vec![]).expire_session_at_visit(3);
    // Visits: login, home, blank -> signed out before the schedule opens
    let fresh = ehr_browser(&config, vec![]).expire_session_at_visit(3);
    let h = harness(vec![stale, fresh.clone()], sessions, jan(2));

    let result = h.pipeline.run(&[jan(2)], RunOptions::default()).await;

    assert_matches!(result, Err(PipelineError::SessionExpiredAfterRetry));
    assert!(h.store.is_empty());
    assert!(fresh.is_closed());
}

#[tokio::test]
async fn test_scrape_timeout_aborts_run() {
    let config = TestConfig::default().practice_fusion();
    let browser = ehr_browser(&config, vec![]).on_click(PRINT_BUTTON, vec![]);
    let h = harness(vec![browser.clone()], InMemorySessionStateStore::new(), jan(2));

    let result = h.pipeline.run(&[jan(2)], RunOptions::default()).await;

    assert_matches!(result, Err(PipelineError::Scrape(ScheduleError::Timeout { .. })));
    assert!(h.store.is_empty());
    assert!(browser.is_closed());
}

#[tokio::test]
async fn test_mismatched_page_is_counted_and_skipped() {
    let config = TestConfig::default().practice_fusion();
    let pages = vec![page_for(jan(2), &[jane()]), page_for(jan(2), &[jane()])];
    let browser = ehr_browser(&config, pages);
    let h = harness(vec![browser], InMemorySessionStateStore::new(), jan(3));

    let summary = h.pipeline.run(&[jan(2), jan(3)], RunOptions::default()).await.unwrap();

    assert_eq!(summary.parse_failures, 1);
    assert_eq!(summary.retrieved, 1);
    assert_eq!(summary.ingest.created, 1);
    assert_eq!(summary.error_count(), 1);
}

#[tokio::test]
async fn test_skip_surveys_only_syncs() {
    let config = TestConfig::default().practice_fusion();
    let browser = ehr_browser(&config, vec![page_for(jan(2), &[jane()])]);
    let h = harness(vec![browser], InMemorySessionStateStore::new(), jan(2));

    let summary = h
        .pipeline
        .run(&[jan(2)], RunOptions { send_surveys: false })
        .await
        .unwrap();

    assert_eq!(summary.ingest.created, 1);
    assert!(summary.surveys.is_none());
    assert!(h.provider.sent.lock().unwrap().is_empty());
    let pending = h.store.query_pending_survey(&PendingSurveyQuery::default()).await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_failed_login_is_auth_error() {
    let config = TestConfig::default().practice_fusion();
    // Login button does nothing, so the login never lands anywhere
    let browser = ehr_browser(&config, vec![]).on_click(LOGIN_BUTTON, vec![]);
    let h = harness(vec![browser.clone()], InMemorySessionStateStore::new(), jan(2));

    let result = h.pipeline.run(&[jan(2)], RunOptions::default()).await;

    assert_matches!(result, Err(PipelineError::Auth(SessionError::Auth(_))));
    assert!(browser.is_closed());
}

#[tokio::test]
async fn test_missing_campaign_fails_before_scraping() {
    let config = TestConfig::default();
    let browser = ehr_browser(&config.practice_fusion(), vec![page_for(jan(2), &[jane()])]);
    let launcher = Arc::new(FakeLauncher::new(vec![browser.clone()]));
    let store = Arc::new(InMemoryAppointmentStore::new());
    let session = EhrSessionManager::new(
        config.practice_fusion(),
        Arc::new(InMemorySessionStateStore::new()),
        Arc::new(NoCode),
    );
    let pipeline = SurveyPipeline::new(
        launcher.clone(),
        session,
        ScheduleScraper::new(config.practice_fusion(), jan(2)),
        AppointmentRegistry::new(store.clone()),
        None,
        SurveyTarget::default(),
    );

    let result = pipeline.run(&[jan(2)], RunOptions::default()).await;

    assert_matches!(result, Err(PipelineError::SurveysNotConfigured));
    assert_eq!(launcher.remaining(), 1);
    assert!(browser.visits().is_empty());
    assert!(store.is_empty());
}
