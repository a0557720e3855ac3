// libs/survey-cell/src/models.rs
use serde::{Deserialize, Serialize};

/// Outbound text as handed to the messaging provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

/// Form body of the Messages API create call.
#[derive(Debug, Serialize)]
pub struct TwilioMessageRequest<'a> {
    #[serde(rename = "To")]
    pub to: &'a str,
    #[serde(rename = "Body")]
    pub body: &'a str,
    #[serde(rename = "MessagingServiceSid")]
    pub messaging_service_sid: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TwilioMessageResponse {
    pub sid: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TwilioErrorResponse {
    pub code: Option<i64>,
    pub message: Option<String>,
}
