use thiserror::Error;

use shared_database::StorageError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Appointment {row_key} already exists")]
    AlreadyExists { row_key: String },

    #[error("Appointment {row_key} not found")]
    NotFound { row_key: String },

    #[error("Stored appointment is malformed: {0}")]
    InvalidRecord(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Patient name has no second token to use as the last name")]
    MissingLastName,
}
