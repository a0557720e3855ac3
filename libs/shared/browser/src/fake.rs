//! Scripted in-process browser used by the cells' tests.
//!
//! Pages are matched by URL substring. Clicking an element applies the
//! effects registered for its selector; pages marked `requiring_auth`
//! redirect to the login URL until something authenticates the session.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrowserError;
use crate::session::{BrowserLauncher, BrowserSession};
use crate::state::{StorageState, StoredCookie};

pub const FAKE_SESSION_COOKIE: &str = "session";
pub const FAKE_SESSION_TOKEN: &str = "fake-authenticated-session";

#[derive(Debug, Clone)]
pub struct FakePage {
    pub url: String,
    pub selectors: HashSet<String>,
    pub source: String,
    pub requires_auth: bool,
    texts: HashMap<String, VecDeque<Vec<String>>>,
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            selectors: HashSet::new(),
            source: String::new(),
            requires_auth: false,
            texts: HashMap::new(),
        }
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selectors.insert(selector.to_string());
        self
    }

    pub fn with_selectors(mut self, selectors: &[&str]) -> Self {
        self.selectors.extend(selectors.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    /// Successive `texts(selector)` calls return successive entries; the
    /// last entry repeats once the others are used up.
    pub fn with_texts(mut self, selector: &str, snapshots: Vec<Vec<&str>>) -> Self {
        let snapshots = snapshots
            .into_iter()
            .map(|texts| texts.into_iter().map(str::to_string).collect())
            .collect();
        self.texts.insert(selector.to_string(), snapshots);
        self.selectors.insert(selector.to_string());
        self
    }

    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }
}

#[derive(Debug, Clone)]
pub enum ClickEffect {
    Navigate(String),
    Reveal(String),
    Hide(String),
    SetSource(String),
    /// Replace the page source with the next queued one.
    NextSource,
    Authenticate,
    OpenAlert,
}

#[derive(Debug, Default)]
struct FakeState {
    pages: Vec<FakePage>,
    current: Option<usize>,
    current_url: String,
    revealed: HashSet<String>,
    hidden: HashSet<String>,
    source_override: Option<String>,
    source_queue: VecDeque<String>,
    effects: HashMap<String, Vec<ClickEffect>>,
    authenticated: bool,
    login_url: Option<String>,
    expire_at_visit: Option<usize>,
    pending_alerts: usize,
    fills: Vec<(String, String)>,
    clicks: Vec<String>,
    visits: Vec<String>,
    restored: usize,
    restore_failure: Option<String>,
    closed: bool,
}

impl FakeState {
    fn navigate(&mut self, url: &str) {
        self.visits.push(url.to_string());
        if self.expire_at_visit == Some(self.visits.len()) {
            self.authenticated = false;
            self.expire_at_visit = None;
        }

        let mut target = url.to_string();
        let mut index = self.find_page(url);
        if let Some(i) = index {
            if self.pages[i].requires_auth && !self.authenticated {
                if let Some(login) = self.login_url.clone() {
                    index = self.find_page(&login);
                    target = login;
                }
            }
        }

        self.current = index;
        self.current_url = target;
        self.revealed.clear();
        self.hidden.clear();
        self.source_override = None;
    }

    fn find_page(&self, url: &str) -> Option<usize> {
        self.pages
            .iter()
            .enumerate()
            .filter(|(_, page)| url.contains(&page.url))
            .max_by_key(|(_, page)| page.url.len())
            .map(|(i, _)| i)
    }

    fn is_present(&self, selector: &str) -> bool {
        if self.hidden.contains(selector) {
            return false;
        }
        self.revealed.contains(selector)
            || self
                .current
                .map(|i| self.pages[i].selectors.contains(selector))
                .unwrap_or(false)
    }

    fn apply(&mut self, key: &str) {
        let effects = self.effects.get(key).cloned().unwrap_or_default();
        for effect in effects {
            match effect {
                ClickEffect::Navigate(url) => self.navigate(&url),
                ClickEffect::Reveal(selector) => {
                    self.hidden.remove(&selector);
                    self.revealed.insert(selector);
                }
                ClickEffect::Hide(selector) => {
                    self.revealed.remove(&selector);
                    self.hidden.insert(selector);
                }
                ClickEffect::SetSource(source) => self.source_override = Some(source),
                ClickEffect::NextSource => {
                    if let Some(source) = self.source_queue.pop_front() {
                        self.source_override = Some(source);
                    }
                }
                ClickEffect::Authenticate => self.authenticated = true,
                ClickEffect::OpenAlert => self.pending_alerts += 1,
            }
        }
    }
}

/// Cloning shares the underlying state, so a test can keep a handle for
/// assertions after handing the browser to the code under test.
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn new(pages: Vec<FakePage>) -> Self {
        let state = FakeState {
            pages,
            ..FakeState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Protected pages redirect here while unauthenticated.
    pub fn with_login_redirect(self, login_url: &str) -> Self {
        self.lock().login_url = Some(login_url.to_string());
        self
    }

    pub fn on_click(self, selector: &str, effects: Vec<ClickEffect>) -> Self {
        self.lock().effects.insert(selector.to_string(), effects);
        self
    }

    pub fn on_enter(self, selector: &str, effects: Vec<ClickEffect>) -> Self {
        self.lock().effects.insert(enter_key(selector), effects);
        self
    }

    pub fn with_source_queue(self, sources: Vec<String>) -> Self {
        self.lock().source_queue = sources.into();
        self
    }

    pub fn authenticated(self) -> Self {
        self.lock().authenticated = true;
        self
    }

    /// Drops authentication when the `visit`th navigation (1-based) happens.
    pub fn expire_session_at_visit(self, visit: usize) -> Self {
        self.lock().expire_at_visit = Some(visit);
        self
    }

    /// Every restore fails with a WebDriver error carrying `message`.
    pub fn failing_restore(self, message: &str) -> Self {
        self.lock().restore_failure = Some(message.to_string());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().authenticated
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.lock().fills.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn visits(&self) -> Vec<String> {
        self.lock().visits.clone()
    }

    pub fn restore_count(&self) -> usize {
        self.lock().restored
    }

    pub fn authenticated_state() -> StorageState {
        StorageState {
            cookies: vec![StoredCookie {
                name: FAKE_SESSION_COOKIE.to_string(),
                value: FAKE_SESSION_TOKEN.to_string(),
                domain: None,
                path: Some("/".to_string()),
                secure: true,
                http_only: true,
            }],
            origins: vec![],
        }
    }
}

fn enter_key(selector: &str) -> String {
    format!("{}:enter", selector)
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.lock().navigate(url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.lock().current_url.clone())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        if self.lock().is_present(selector) {
            Ok(())
        } else {
            Err(BrowserError::timeout(selector, timeout))
        }
    }

    async fn is_present(&self, selector: &str) -> Result<bool, BrowserError> {
        Ok(self.lock().is_present(selector))
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        if !state.is_present(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        state.clicks.push(selector.to_string());
        state.apply(selector);
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        if !state.is_present(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        state.fills.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        if !state.is_present(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        let key = enter_key(selector);
        state.clicks.push(key.clone());
        state.apply(&key);
        Ok(())
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>, BrowserError> {
        let mut state = self.lock();
        let Some(index) = state.current else {
            return Ok(Vec::new());
        };
        let Some(snapshots) = state.pages[index].texts.get_mut(selector) else {
            return Ok(Vec::new());
        };
        let texts = if snapshots.len() > 1 {
            snapshots.pop_front().unwrap_or_default()
        } else {
            snapshots.front().cloned().unwrap_or_default()
        };
        Ok(texts)
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        let state = self.lock();
        if let Some(source) = &state.source_override {
            return Ok(source.clone());
        }
        Ok(state
            .current
            .map(|i| state.pages[i].source.clone())
            .unwrap_or_default())
    }

    async fn accept_alert(&self) -> Result<bool, BrowserError> {
        let mut state = self.lock();
        if state.pending_alerts > 0 {
            state.pending_alerts -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn storage_state(&self) -> Result<StorageState, BrowserError> {
        if self.lock().authenticated {
            Ok(Self::authenticated_state())
        } else {
            Ok(StorageState::default())
        }
    }

    async fn restore_storage_state(&self, state: &StorageState) -> Result<(), BrowserError> {
        let mut inner = self.lock();
        inner.restored += 1;
        if let Some(message) = &inner.restore_failure {
            return Err(BrowserError::WebDriver(message.clone()));
        }
        if state
            .cookies
            .iter()
            .any(|c| c.name == FAKE_SESSION_COOKIE && c.value == FAKE_SESSION_TOKEN)
        {
            inner.authenticated = true;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.lock().closed = true;
        Ok(())
    }
}

/// Hands out pre-scripted browsers in order.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    browsers: Mutex<VecDeque<FakeBrowser>>,
}

impl FakeLauncher {
    pub fn new(browsers: Vec<FakeBrowser>) -> Self {
        Self {
            browsers: Mutex::new(browsers.into()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.browsers
            .lock()
            .map(|queue| queue.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let next = self
            .browsers
            .lock()
            .map_err(|_| BrowserError::Launch("launcher lock poisoned".to_string()))?
            .pop_front();
        match next {
            Some(browser) => Ok(Box::new(browser)),
            None => Err(BrowserError::Launch("no scripted browser left".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ehr() -> FakeBrowser {
        FakeBrowser::new(vec![
            FakePage::new("#/login").with_selectors(&["#inputUsername", "#loginButton"]),
            FakePage::new("#/PF/").requiring_auth().with_source("<h3>home</h3>"),
        ])
        .with_login_redirect("https://ehr.test/#/login")
        .on_click(
            "#loginButton",
            vec![ClickEffect::Authenticate, ClickEffect::Navigate("https://ehr.test/#/PF/home".to_string())],
        )
    }

    #[tokio::test]
    async fn test_protected_page_redirects_until_login() {
        let browser = ehr();
        browser.goto("https://ehr.test/#/PF/home").await.unwrap();
        assert_eq!(browser.current_url().await.unwrap(), "https://ehr.test/#/login");

        browser.fill("#inputUsername", "user").await.unwrap();
        browser.click("#loginButton").await.unwrap();

        assert!(browser.is_authenticated());
        assert_eq!(browser.current_url().await.unwrap(), "https://ehr.test/#/PF/home");
        assert_eq!(browser.page_source().await.unwrap(), "<h3>home</h3>");
        assert_eq!(browser.fills(), vec![("#inputUsername".to_string(), "user".to_string())]);
    }

    #[tokio::test]
    async fn test_storage_state_round_trips_authentication() {
        let first = ehr().authenticated();
        let state = first.storage_state().await.unwrap();

        let second = ehr();
        second.restore_storage_state(&state).await.unwrap();
        second.goto("https://ehr.test/#/PF/home").await.unwrap();
        assert_eq!(second.current_url().await.unwrap(), "https://ehr.test/#/PF/home");
    }

    #[tokio::test]
    async fn test_missing_element_errors() {
        let browser = ehr();
        browser.goto("https://ehr.test/#/login").await.unwrap();
        assert_matches!(browser.click("#nope").await, Err(BrowserError::ElementNotFound(_)));
        assert_matches!(
            browser.wait_for("#nope", Duration::from_millis(1)).await,
            Err(BrowserError::Timeout { .. })
        );
    }

    #[tokio::test]
    async fn test_text_snapshots_advance() {
        let browser = FakeBrowser::new(vec![FakePage::new("/messages").with_texts("div.msg", vec![vec![], vec!["code 1"]])]);
        browser.goto("https://portal.test/messages").await.unwrap();

        assert!(browser.texts("div.msg").await.unwrap().is_empty());
        assert_eq!(browser.texts("div.msg").await.unwrap(), vec!["code 1"]);
        assert_eq!(browser.texts("div.msg").await.unwrap(), vec!["code 1"]);
    }

    #[tokio::test]
    async fn test_launcher_hands_out_browsers_in_order() {
        let launcher = FakeLauncher::new(vec![FakeBrowser::default()]);
        assert!(launcher.launch().await.is_ok());
        assert_matches!(launcher.launch().await.err(), Some(BrowserError::Launch(_)));
    }
}
