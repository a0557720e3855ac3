use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrowserError;
use crate::state::StorageState;

/// One automated browser page. Selectors are CSS.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Waits until `selector` matches an element or `timeout` elapses.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn is_present(&self, selector: &str) -> Result<bool, BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Replaces the value of an input.
    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError>;

    async fn press_enter(&self, selector: &str) -> Result<(), BrowserError>;

    /// Text content of every element matching `selector`, in document order.
    async fn texts(&self, selector: &str) -> Result<Vec<String>, BrowserError>;

    async fn page_source(&self) -> Result<String, BrowserError>;

    /// Accepts a pending dialog. Returns false when none was open.
    async fn accept_alert(&self) -> Result<bool, BrowserError>;

    async fn storage_state(&self) -> Result<StorageState, BrowserError>;

    async fn restore_storage_state(&self, state: &StorageState) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
