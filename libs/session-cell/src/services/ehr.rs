use std::sync::Arc;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use shared_browser::wait::wait_for_url;
use shared_browser::{BrowserError, BrowserSession};
use shared_config::PracticeFusionConfig;
use shared_utils::RetryPolicy;

use crate::error::SessionError;
use crate::models::{SessionMode, SessionOutcome, SessionPhase, EHR_SITE};
use crate::services::mfa::MfaCodeSource;
use crate::services::state_store::SessionStateStore;

pub const USERNAME_INPUT: &str = "#inputUsername";
pub const PASSWORD_INPUT: &str = "#inputPswd";
pub const LOGIN_BUTTON: &str = "#loginButton";
pub const SEND_CALL_BUTTON: &str = "#sendCallButton";
pub const CODE_INPUT: &str = "#code";
pub const SEND_CODE_BUTTON: &str = "#sendCodeButton";
/// Only rendered for a signed-in user on the schedule route.
pub const AUTHENTICATED_MARKER: &str = r#"div[data-element="appointments-table"]"#;

enum LoginLanding {
    MainPage,
    MfaRequired,
}

/// Drives the EHR login state machine and keeps its persisted state in sync.
pub struct EhrSessionManager {
    config: PracticeFusionConfig,
    state_store: Arc<dyn SessionStateStore>,
    code_source: Arc<dyn MfaCodeSource>,
    code_retry: RetryPolicy,
}

impl EhrSessionManager {
    pub fn new(
        config: PracticeFusionConfig,
        state_store: Arc<dyn SessionStateStore>,
        code_source: Arc<dyn MfaCodeSource>,
    ) -> Self {
        Self {
            config,
            state_store,
            code_source,
            code_retry: RetryPolicy::new(2, std::time::Duration::from_secs(5)),
        }
    }

    pub fn with_code_retry(mut self, policy: RetryPolicy) -> Self {
        self.code_retry = policy;
        self
    }

    pub fn config(&self) -> &PracticeFusionConfig {
        &self.config
    }

    /// Leaves `browser` signed in to the EHR. State is persisted whatever
    /// the outcome.
    #[instrument(skip(self, browser))]
    pub async fn establish(
        &self,
        browser: &dyn BrowserSession,
        mode: SessionMode,
    ) -> Result<SessionOutcome, SessionError> {
        let mut outcome = SessionOutcome::new();
        let result = self.run_state_machine(browser, mode, &mut outcome).await;

        match browser.storage_state().await {
            Ok(state) => {
                if let Err(e) = self.state_store.save(EHR_SITE, &state).await {
                    warn!("Could not persist EHR session state: {}", e);
                }
            }
            Err(e) => warn!("Could not read EHR session state: {}", e),
        }

        match result {
            Ok(()) => {
                outcome.enter(SessionPhase::Authenticated);
                info!("EHR session established (reused cached: {})", outcome.reused_cached);
                Ok(outcome)
            }
            Err(e) => Err(e),
        }
    }

    /// Discards the persisted state so the next attempt logs in fresh.
    pub async fn invalidate(&self) -> Result<(), SessionError> {
        info!("Invalidating cached EHR session state");
        self.state_store.delete(EHR_SITE).await
    }

    async fn run_state_machine(
        &self,
        browser: &dyn BrowserSession,
        mode: SessionMode,
        outcome: &mut SessionOutcome,
    ) -> Result<(), SessionError> {
        if mode == SessionMode::ReuseCached {
            outcome.enter(SessionPhase::ValidatingCachedSession);
            if self.validate_cached(browser).await? {
                outcome.enter(SessionPhase::SessionValid);
                outcome.reused_cached = true;
                return Ok(());
            }
            outcome.enter(SessionPhase::SessionInvalid);
        }

        outcome.enter(SessionPhase::CredentialLogin);
        match self.credential_login(browser).await? {
            LoginLanding::MainPage => {}
            LoginLanding::MfaRequired => {
                outcome.enter(SessionPhase::MfaRequired);
                self.handle_mfa(browser).await?;
                outcome.enter(SessionPhase::MfaHandled);
            }
        }

        wait_for_url(
            browser,
            "authenticated EHR route",
            |url| url.contains(&self.config.authenticated_route),
            self.config.auth_timeout,
            self.config.poll_interval,
        )
        .await
        .map_err(|e| match e {
            BrowserError::Timeout { after, .. } => SessionError::Auth(format!(
                "not on an authenticated page {:?} after submitting credentials",
                after
            )),
            other => other.into(),
        })?;
        outcome.enter(SessionPhase::MainPage);
        Ok(())
    }

    /// Restores persisted state and checks it against a protected page.
    /// Anything short of a clear authenticated signal counts as invalid.
    async fn validate_cached(&self, browser: &dyn BrowserSession) -> Result<bool, SessionError> {
        let state = match self.state_store.load(EHR_SITE).await {
            Ok(Some(state)) if !state.is_empty() => state,
            Ok(_) => {
                debug!("No cached EHR session state");
                return Ok(false);
            }
            Err(e) => {
                warn!("Could not load cached EHR session state: {}", e);
                return Ok(false);
            }
        };

        if let Err(e) = browser.restore_storage_state(&state).await {
            warn!("Could not restore cached EHR session state: {}", e);
            return Ok(false);
        }
        browser.goto(&self.config.schedule_url()).await?;

        let url = browser.current_url().await?;
        if url.contains(&self.config.login_route) {
            info!("Cached EHR session redirected to login");
            return Ok(false);
        }
        if !url.contains(&self.config.authenticated_route) {
            info!("Cached EHR session landed on unexpected page {}", url);
            return Ok(false);
        }

        match browser.wait_for(AUTHENTICATED_MARKER, self.config.wait_timeout).await {
            Ok(()) => {
                info!("Cached EHR session is valid");
                Ok(true)
            }
            Err(e) => {
                info!("Cached EHR session did not render the schedule: {}", e);
                Ok(false)
            }
        }
    }

    async fn credential_login(&self, browser: &dyn BrowserSession) -> Result<LoginLanding, SessionError> {
        info!("Logging into EHR as {}", self.config.username);
        browser.goto(&self.config.login_url()).await?;

        browser.wait_for(USERNAME_INPUT, self.config.wait_timeout).await?;
        browser.fill(USERNAME_INPUT, &self.config.username).await?;
        browser.fill(PASSWORD_INPUT, &self.config.password).await?;
        browser.click(LOGIN_BUTTON).await?;

        let deadline = Instant::now() + self.config.auth_timeout;
        loop {
            let url = browser.current_url().await?;
            if url.contains(&self.config.mfa_route) || browser.is_present(SEND_CALL_BUTTON).await? {
                return Ok(LoginLanding::MfaRequired);
            }
            if url.contains(&self.config.authenticated_route) {
                return Ok(LoginLanding::MainPage);
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Auth(format!(
                    "login did not reach the main page or security check (stuck at {})",
                    url
                )));
            }
            sleep(self.config.poll_interval).await;
        }
    }

    async fn handle_mfa(&self, browser: &dyn BrowserSession) -> Result<(), SessionError> {
        info!("EHR requested MFA, sending code by call");
        browser.wait_for(SEND_CALL_BUTTON, self.config.wait_timeout).await?;
        browser.click(SEND_CALL_BUTTON).await?;

        sleep(self.config.mfa_settle_delay).await;

        let code = self
            .code_retry
            .run_while(
                "fetch MFA code",
                |_| self.code_source.latest_code(),
                |e: &SessionError| matches!(e, SessionError::MfaCodeNotFound { .. }),
            )
            .await?;

        browser.wait_for(CODE_INPUT, self.config.wait_timeout).await?;
        browser.fill(CODE_INPUT, &code).await?;
        browser.click(SEND_CODE_BUTTON).await?;
        debug!("Submitted MFA code");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mfa::MockMfaCodeSource;
    use crate::services::state_store::InMemorySessionStateStore;
    use assert_matches::assert_matches;
    use shared_browser::fake::{ClickEffect, FakeBrowser, FakePage};
    use shared_utils::test_utils::TestConfig;
    use std::time::Duration;

    fn config() -> PracticeFusionConfig {
        TestConfig::default().practice_fusion()
    }

    /// EHR with a login form, a security check and a protected schedule.
    fn ehr_browser(config: &PracticeFusionConfig) -> FakeBrowser {
        FakeBrowser::new(vec![
            FakePage::new("#/login").with_selectors(&[USERNAME_INPUT, PASSWORD_INPUT, LOGIN_BUTTON]),
            FakePage::new("#/security-check").with_selectors(&[SEND_CALL_BUTTON, CODE_INPUT, SEND_CODE_BUTTON]),
            FakePage::new("#/PF/").requiring_auth().with_selector(AUTHENTICATED_MARKER),
        ])
        .with_login_redirect(&config.login_url())
        .on_click(
            LOGIN_BUTTON,
            vec![ClickEffect::Navigate(format!("{}#/security-check", config.base_url))],
        )
        .on_click(
            SEND_CODE_BUTTON,
            vec![
                ClickEffect::Authenticate,
                ClickEffect::Navigate(format!("{}#/PF/home", config.base_url)),
            ],
        )
    }

    fn code_source(code: &'static str, times: usize) -> Arc<MockMfaCodeSource> {
        let mut source = MockMfaCodeSource::new();
        source
            .expect_latest_code()
            .times(times)
            .returning(move || Ok(code.to_string()));
        Arc::new(source)
    }

    #[tokio::test]
    async fn test_fresh_login_walks_through_mfa() {
        let config = config();
        let browser = ehr_browser(&config);
        let store = Arc::new(InMemorySessionStateStore::new());
        let manager = EhrSessionManager::new(config.clone(), store.clone(), code_source("123456", 1));

        let outcome = manager.establish(&browser, SessionMode::ReuseCached).await.unwrap();

        assert!(!outcome.reused_cached);
        assert_eq!(
            outcome.phases,
            vec![
                SessionPhase::NoSession,
                SessionPhase::ValidatingCachedSession,
                SessionPhase::SessionInvalid,
                SessionPhase::CredentialLogin,
                SessionPhase::MfaRequired,
                SessionPhase::MfaHandled,
                SessionPhase::MainPage,
                SessionPhase::Authenticated,
            ]
        );
        assert!(browser.fills().contains(&(CODE_INPUT.to_string(), "123456".to_string())));
        assert!(browser.fills().contains(&(USERNAME_INPUT.to_string(), "pf-user".to_string())));
        assert_eq!(store.get(EHR_SITE), Some(FakeBrowser::authenticated_state()));
    }

    #[tokio::test]
    async fn test_valid_cached_state_skips_login() {
        let config = config();
        let browser = ehr_browser(&config);
        let store = Arc::new(InMemorySessionStateStore::with_state(EHR_SITE, FakeBrowser::authenticated_state()));
        let manager = EhrSessionManager::new(config, store, code_source("unused", 0));

        let outcome = manager.establish(&browser, SessionMode::ReuseCached).await.unwrap();

        assert!(outcome.reused_cached);
        assert!(outcome.passed_through(SessionPhase::SessionValid));
        assert!(!outcome.passed_through(SessionPhase::CredentialLogin));
        assert!(browser.fills().is_empty());
    }

    #[tokio::test]
    async fn test_failed_restore_falls_back_to_credential_login() {
        let config = config();
        let browser = ehr_browser(&config).failing_restore("stale origin unreachable");
        let store = Arc::new(InMemorySessionStateStore::with_state(EHR_SITE, FakeBrowser::authenticated_state()));
        let manager = EhrSessionManager::new(config, store, code_source("246810", 1));

        let outcome = manager.establish(&browser, SessionMode::ReuseCached).await.unwrap();

        assert!(!outcome.reused_cached);
        assert!(outcome.passed_through(SessionPhase::SessionInvalid));
        assert!(outcome.passed_through(SessionPhase::CredentialLogin));
        assert!(outcome.passed_through(SessionPhase::Authenticated));
        assert_eq!(browser.restore_count(), 1);
    }

    #[tokio::test]
    async fn test_force_login_ignores_cached_state() {
        let config = config();
        let browser = ehr_browser(&config);
        let store = Arc::new(InMemorySessionStateStore::with_state(EHR_SITE, FakeBrowser::authenticated_state()));
        let manager = EhrSessionManager::new(config, store, code_source("654321", 1));

        let outcome = manager.establish(&browser, SessionMode::ForceLogin).await.unwrap();

        assert!(!outcome.passed_through(SessionPhase::ValidatingCachedSession));
        assert!(outcome.passed_through(SessionPhase::CredentialLogin));
        assert_eq!(browser.restore_count(), 0);
    }

    #[tokio::test]
    async fn test_login_without_mfa_lands_on_main_page() {
        let config = config();
        let browser = FakeBrowser::new(vec![
            FakePage::new("#/login").with_selectors(&[USERNAME_INPUT, PASSWORD_INPUT, LOGIN_BUTTON]),
            FakePage::new("#/PF/").requiring_auth(),
        ])
        .with_login_redirect(&config.login_url())
        .on_click(
            LOGIN_BUTTON,
            vec![
                ClickEffect::Authenticate,
                ClickEffect::Navigate(format!("{}#/PF/home", config.base_url)),
            ],
        );
        let manager = EhrSessionManager::new(config, Arc::new(InMemorySessionStateStore::new()), code_source("unused", 0));

        let outcome = manager.establish(&browser, SessionMode::ForceLogin).await.unwrap();
        assert!(!outcome.passed_through(SessionPhase::MfaRequired));
        assert!(outcome.passed_through(SessionPhase::MainPage));
    }

    #[tokio::test]
    async fn test_rejected_mfa_is_auth_error_and_state_still_saved() {
        let config = config();
        // Submitting the code leaves the browser on the security check.
        let browser = ehr_browser(&config).on_click(SEND_CODE_BUTTON, vec![]);
        let store = Arc::new(InMemorySessionStateStore::new());
        let manager = EhrSessionManager::new(config, store.clone(), code_source("000000", 1));

        let result = manager.establish(&browser, SessionMode::ForceLogin).await;

        assert_matches!(result, Err(SessionError::Auth(_)));
        assert_eq!(store.get(EHR_SITE), Some(shared_browser::StorageState::default()));
    }

    #[tokio::test]
    async fn test_missing_code_is_retried_then_fatal() {
        let config = config();
        let browser = ehr_browser(&config);
        let mut source = MockMfaCodeSource::new();
        source
            .expect_latest_code()
            .times(2)
            .returning(|| Err(SessionError::MfaCodeNotFound { waited: Duration::ZERO }));
        let manager = EhrSessionManager::new(config, Arc::new(InMemorySessionStateStore::new()), Arc::new(source))
            .with_code_retry(RetryPolicy::new(2, Duration::ZERO));

        let result = manager.establish(&browser, SessionMode::ForceLogin).await;

        assert_matches!(result, Err(SessionError::MfaCodeNotFound { .. }));
        assert!(!browser.fills().iter().any(|(selector, _)| selector == CODE_INPUT));
    }

    #[tokio::test]
    async fn test_invalidate_removes_state() {
        let store = Arc::new(InMemorySessionStateStore::with_state(EHR_SITE, FakeBrowser::authenticated_state()));
        let manager = EhrSessionManager::new(config(), store.clone(), code_source("unused", 0));

        manager.invalidate().await.unwrap();
        assert!(!store.contains(EHR_SITE));
    }
}
