use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Appointment {row_key} has no phone number")]
    MissingPhone { row_key: String },

    #[error("Provider accepted the message but returned no delivery id")]
    MissingDeliveryId,

    #[error("Messaging provider not configured")]
    NotConfigured,

    #[error("Messaging provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
