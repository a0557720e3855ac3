use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{cookies::Cookie, error::CmdError, Client, ClientBuilder, Locator};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::BrowserConfig;

use crate::error::BrowserError;
use crate::session::{BrowserLauncher, BrowserSession};
use crate::state::{LocalStorageEntry, OriginState, StorageState, StoredCookie};

const READ_LOCAL_STORAGE: &str =
    "return [window.location.origin, JSON.stringify(Object.entries(window.localStorage))];";
const WRITE_LOCAL_STORAGE: &str =
    "for (const [k, v] of arguments[0]) { window.localStorage.setItem(k, v); } return null;";

impl From<CmdError> for BrowserError {
    fn from(e: CmdError) -> Self {
        if e.is_no_such_element() {
            BrowserError::ElementNotFound(e.to_string())
        } else {
            BrowserError::WebDriver(e.to_string())
        }
    }
}

/// Starts Chrome sessions through a WebDriver endpoint.
pub struct WebDriverLauncher {
    config: BrowserConfig,
}

impl WebDriverLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn chrome_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!("--window-size={},{}", self.config.window_width, self.config.window_height),
            format!("--user-agent={}", self.config.user_agent),
        ];
        if self.config.headless {
            args.push("--headless=new".to_string());
        }
        args
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let mut capabilities = serde_json::Map::new();
        capabilities.insert("browserName".to_string(), json!("chrome"));
        capabilities.insert("goog:chromeOptions".to_string(), json!({ "args": self.chrome_args() }));

        let client = ClientBuilder::native()
            .capabilities(capabilities)
            .connect(&self.config.webdriver_url)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        info!(
            "Browser session started (headless: {}, webdriver: {})",
            self.config.headless, self.config.webdriver_url
        );
        Ok(Box::new(WebDriverBrowser { client }))
    }
}

pub struct WebDriverBrowser {
    client: Client,
}

impl WebDriverBrowser {
    async fn read_local_storage(&self) -> Result<Option<OriginState>, BrowserError> {
        let value = self.client.execute(READ_LOCAL_STORAGE, vec![]).await?;
        let (origin, entries) = match value.as_array().map(Vec::as_slice) {
            Some([Value::String(origin), Value::String(entries)]) => (origin.clone(), entries.clone()),
            _ => return Err(BrowserError::Script(format!("Unexpected localStorage dump: {}", value))),
        };

        // about:blank and data: pages report an opaque origin
        if origin == "null" {
            return Ok(None);
        }

        let pairs: Vec<(String, String)> = serde_json::from_str(&entries)?;
        Ok(Some(OriginState {
            origin,
            local_storage: pairs
                .into_iter()
                .map(|(name, value)| LocalStorageEntry { name, value })
                .collect(),
        }))
    }

    async fn add_cookies_for_current_host(&self, state: &StorageState) -> Result<(), BrowserError> {
        let host = self.client.current_url().await?.host_str().unwrap_or_default().to_string();

        for stored in state.cookies_for_host(&host) {
            let mut cookie = Cookie::new(stored.name.clone(), stored.value.clone());
            if let Some(domain) = &stored.domain {
                cookie.set_domain(domain.clone());
            }
            cookie.set_path(stored.path.clone().unwrap_or_else(|| "/".to_string()));
            cookie.set_secure(stored.secure);
            cookie.set_http_only(stored.http_only);
            if let Err(e) = self.client.add_cookie(cookie).await {
                warn!("Could not restore cookie {} on {}: {}", stored.name, host, e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for WebDriverBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        debug!("Navigating to {}", url);
        self.client.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        match self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(selector))
            .await
        {
            Ok(_) => Ok(()),
            Err(CmdError::WaitTimeout) => Err(BrowserError::timeout(selector, timeout)),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_present(&self, selector: &str) -> Result<bool, BrowserError> {
        let found = self.client.find_all(Locator::Css(selector)).await?;
        Ok(!found.is_empty())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.client.find(Locator::Css(selector)).await?.click().await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let element = self.client.find(Locator::Css(selector)).await?;
        element.clear().await?;
        element.send_keys(value).await?;
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self.client.find(Locator::Css(selector)).await?;
        element.send_keys("\u{E007}").await?;
        Ok(())
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>, BrowserError> {
        let elements = self.client.find_all(Locator::Css(selector)).await?;
        let mut texts = Vec::with_capacity(elements.len());
        for element in elements {
            texts.push(element.text().await?);
        }
        Ok(texts)
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        Ok(self.client.source().await?)
    }

    async fn accept_alert(&self) -> Result<bool, BrowserError> {
        match self.client.accept_alert().await {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("No dialog to accept: {}", e);
                Ok(false)
            }
        }
    }

    async fn storage_state(&self) -> Result<StorageState, BrowserError> {
        let cookies = self
            .client
            .get_all_cookies()
            .await?
            .into_iter()
            .map(|cookie| StoredCookie {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
                domain: cookie.domain().map(str::to_string),
                path: cookie.path().map(str::to_string),
                secure: cookie.secure().unwrap_or(false),
                http_only: cookie.http_only().unwrap_or(false),
            })
            .collect();

        let origins = self.read_local_storage().await?.into_iter().collect();

        Ok(StorageState { cookies, origins })
    }

    async fn restore_storage_state(&self, state: &StorageState) -> Result<(), BrowserError> {
        // Cookies and localStorage can only be written for the origin
        // currently loaded, so visit each stored origin first.
        for origin in &state.origins {
            self.client.goto(&origin.origin).await?;
            self.add_cookies_for_current_host(state).await?;

            let entries: Vec<Value> = origin
                .local_storage
                .iter()
                .map(|entry| json!([entry.name, entry.value]))
                .collect();
            self.client
                .execute(WRITE_LOCAL_STORAGE, vec![Value::Array(entries)])
                .await?;
        }

        let (extra_origins, unplaced) = state.uncovered_cookie_origins();
        for origin in &extra_origins {
            self.client.goto(origin).await?;
            self.add_cookies_for_current_host(state).await?;
        }
        if unplaced > 0 {
            warn!("Skipped {} cookies with no domain and no stored origin", unplaced);
        }

        debug!(
            "Restored {} cookies across {} origins",
            state.cookies.len() - unplaced,
            state.origins.len() + extra_origins.len()
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.client.clone().close().await?;
        Ok(())
    }
}
