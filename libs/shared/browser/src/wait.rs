use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::BrowserError;
use crate::session::BrowserSession;

/// Polls the current URL until `predicate` accepts it.
pub async fn wait_for_url<P>(
    browser: &dyn BrowserSession,
    description: &str,
    predicate: P,
    timeout: Duration,
    poll: Duration,
) -> Result<String, BrowserError>
where
    P: Fn(&str) -> bool + Send,
{
    let deadline = Instant::now() + timeout;
    loop {
        let url = browser.current_url().await?;
        if predicate(&url) {
            return Ok(url);
        }
        if Instant::now() >= deadline {
            debug!("Still at {} after {:?}", url, timeout);
            return Err(BrowserError::timeout(description, timeout));
        }
        sleep(poll).await;
    }
}
