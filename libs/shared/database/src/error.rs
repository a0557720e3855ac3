use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid storage configuration: {0}")]
    Config(String),

    #[error("Entity already exists")]
    Conflict,

    #[error("Resource not found")]
    NotFound,

    #[error("Storage authentication error: {0}")]
    Auth(String),

    #[error("Storage API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            409 => StorageError::Conflict,
            404 => StorageError::NotFound,
            401 | 403 => StorageError::Auth(body),
            _ => StorageError::Api { status, body },
        }
    }
}
