use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use shared_browser::wait::wait_for_url;
use shared_browser::{BrowserLauncher, BrowserSession};
use shared_config::CallHarborConfig;

use crate::error::SessionError;
use crate::models::CALLHARBOR_SITE;
use crate::services::state_store::SessionStateStore;
use crate::services::totp;

pub const USERNAME_INPUT: &str = r#"input[name="data[Login][username]"]"#;
pub const PASSWORD_INPUT: &str = r#"input[name="data[Login][password]"]"#;
pub const PASSCODE_INPUT: &str = r#"input[name="data[Login][passcode]"]"#;
pub const LOGIN_SUBMIT: &str = r#"input[type="submit"][value="Log In"]"#;
pub const PASSCODE_SUBMIT: &str = r#"input[type="submit"][value="Submit"]"#;
pub const RECENT_MESSAGE: &str = "div.conversation-recent-msg";

const LOGIN_PATH: &str = "/portal/login";
const MFA_PATH: &str = "/portal/login/mfa";

/// Anything that can produce the one-time code the EHR sent out of band.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MfaCodeSource: Send + Sync {
    async fn latest_code(&self) -> Result<String, SessionError>;
}

/// First `Your code is: <digits>` code found in the given message texts.
pub fn extract_code<'a, I>(messages: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    // The pattern is a literal; it cannot fail to compile.
    let pattern = Regex::new(r"Your code is: (\d+)").ok()?;
    messages
        .into_iter()
        .find_map(|text| pattern.captures(text).map(|c| c[1].to_string()))
}

/// Reads EHR codes from the CallHarbor web inbox.
pub struct CallHarborCodeRetriever {
    config: CallHarborConfig,
    launcher: Arc<dyn BrowserLauncher>,
    state_store: Arc<dyn SessionStateStore>,
}

impl CallHarborCodeRetriever {
    pub fn new(
        config: CallHarborConfig,
        launcher: Arc<dyn BrowserLauncher>,
        state_store: Arc<dyn SessionStateStore>,
    ) -> Self {
        Self {
            config,
            launcher,
            state_store,
        }
    }

    async fn retrieve(&self, browser: &dyn BrowserSession) -> Result<String, SessionError> {
        match self.state_store.load(CALLHARBOR_SITE).await {
            Ok(Some(state)) => browser.restore_storage_state(&state).await?,
            Ok(None) => {}
            Err(e) => warn!("Could not load portal session state: {}", e),
        }

        let inbox = self.config.messages_url();
        browser.goto(&inbox).await?;

        if browser.current_url().await?.contains(LOGIN_PATH) {
            self.login(browser).await?;
            browser.goto(&inbox).await?;
        } else {
            debug!("Reused portal session");
        }

        self.poll_inbox(browser, &inbox).await
    }

    async fn login(&self, browser: &dyn BrowserSession) -> Result<(), SessionError> {
        info!("Logging into messaging portal as {}", self.config.username);

        browser.wait_for(USERNAME_INPUT, self.config.wait_timeout).await?;
        browser.fill(USERNAME_INPUT, &self.config.username).await?;
        browser.fill(PASSWORD_INPUT, &self.config.password).await?;
        browser.click(LOGIN_SUBMIT).await?;

        let landed = wait_for_url(
            browser,
            "portal login",
            |url| url.contains(MFA_PATH) || !url.contains(LOGIN_PATH),
            self.config.wait_timeout,
            self.config.poll_interval,
        )
        .await
        .map_err(|_| SessionError::Auth("messaging portal rejected the credentials".to_string()))?;

        if landed.contains(MFA_PATH) {
            debug!("Messaging portal requested its own MFA");
            let passcode = totp::current(&self.config.mfa_secret)?;
            browser.fill(PASSCODE_INPUT, &passcode).await?;
            browser.click(PASSCODE_SUBMIT).await?;

            wait_for_url(
                browser,
                "portal MFA",
                |url| !url.contains(LOGIN_PATH),
                self.config.wait_timeout,
                self.config.poll_interval,
            )
            .await
            .map_err(|_| SessionError::Auth("messaging portal rejected the TOTP passcode".to_string()))?;
        }

        Ok(())
    }

    async fn poll_inbox(&self, browser: &dyn BrowserSession, inbox: &str) -> Result<String, SessionError> {
        let started = Instant::now();
        let deadline = started + self.config.code_wait_timeout;

        loop {
            let messages = browser.texts(RECENT_MESSAGE).await?;
            debug!("Inbox shows {} recent messages", messages.len());
            if let Some(code) = extract_code(messages.iter().map(String::as_str)) {
                info!("Found MFA code in messaging portal");
                return Ok(code);
            }

            if Instant::now() >= deadline {
                return Err(SessionError::MfaCodeNotFound {
                    waited: started.elapsed(),
                });
            }
            sleep(self.config.poll_interval.max(Duration::from_millis(1))).await;
            browser.goto(inbox).await?;
        }
    }
}

#[async_trait]
impl MfaCodeSource for CallHarborCodeRetriever {
    #[instrument(skip(self))]
    async fn latest_code(&self) -> Result<String, SessionError> {
        let browser = self.launcher.launch().await?;

        let result = self.retrieve(browser.as_ref()).await;

        // Keep portal cookies even when no code was found.
        match browser.storage_state().await {
            Ok(state) => {
                if let Err(e) = self.state_store.save(CALLHARBOR_SITE, &state).await {
                    warn!("Could not persist portal session state: {}", e);
                }
            }
            Err(e) => warn!("Could not read portal session state: {}", e),
        }
        if let Err(e) = browser.close().await {
            warn!("Could not close portal browser: {}", e);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_first_matching_code() {
        let messages = [
            "Reminder: your appointment is tomorrow",
            "Your code is: 482913. Thank you.",
            "Your code is: 111111. Thank you.",
        ];
        assert_eq!(extract_code(messages), Some("482913".to_string()));
    }

    #[test]
    fn test_no_code_in_messages() {
        assert_eq!(extract_code(["Your code is pending"]), None);
        assert_eq!(extract_code(Vec::<&str>::new()), None);
    }
}
