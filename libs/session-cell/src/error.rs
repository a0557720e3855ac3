use std::time::Duration;

use thiserror::Error;

use shared_browser::BrowserError;
use shared_database::StorageError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("No MFA code found in the messaging portal after {waited:?}")]
    MfaCodeNotFound { waited: Duration },

    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Session state storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session state file error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Errors that end the login attempt for good.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SessionError::Auth(_) | SessionError::MfaCodeNotFound { .. })
    }
}
