// libs/survey-cell/src/services/twilio.rs
use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use shared_config::TwilioConfig;

use crate::error::DispatchError;
use crate::models::{SmsMessage, TwilioErrorResponse, TwilioMessageRequest, TwilioMessageResponse};

/// Sends a single text and returns the provider's delivery id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send(&self, message: &SmsMessage) -> Result<String, DispatchError>;
}

/// Twilio Messages API client sending through a messaging service.
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    messaging_service_sid: String,
    base_url: String,
}

impl fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioClient")
            .field("account_sid", &self.account_sid)
            .field("messaging_service_sid", &self.messaging_service_sid)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TwilioClient {
    pub fn new(config: &TwilioConfig) -> Result<Self, DispatchError> {
        if !config.is_configured() {
            return Err(DispatchError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            messaging_service_sid: config.campaign_sid.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.base_url, self.account_sid)
    }
}

#[async_trait]
impl MessagingProvider for TwilioClient {
    async fn send(&self, message: &SmsMessage) -> Result<String, DispatchError> {
        let url = self.messages_url();
        let form = TwilioMessageRequest {
            to: &message.to,
            body: &message.body,
            messaging_service_sid: &self.messaging_service_sid,
        };

        debug!("Sending message request to: {}", url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<TwilioErrorResponse>(&response_text)
                .ok()
                .and_then(|e| e.message.map(|m| format!("{} (code {})", m, e.code.unwrap_or_default())))
                .unwrap_or(response_text);
            error!("Twilio message create failed: {} - {}", status, detail);
            return Err(DispatchError::Provider(format!("HTTP {}: {}", status, detail)));
        }

        let created: TwilioMessageResponse = serde_json::from_str(&response_text)
            .map_err(|e| DispatchError::Provider(format!("Failed to parse message response: {}", e)))?;

        let sid = created
            .sid
            .filter(|sid| !sid.is_empty())
            .ok_or(DispatchError::MissingDeliveryId)?;

        info!(sid = %sid, status = ?created.status, "sms sent");
        Ok(sid)
    }
}
