use std::sync::Arc;

use tracing::{info, instrument};

use shared_config::TwilioConfig;

use crate::error::DispatchError;
use crate::models::SmsMessage;
use crate::services::twilio::MessagingProvider;

/// Builds the personalised survey text and hands it to the provider.
pub struct SurveyDispatcher {
    provider: Arc<dyn MessagingProvider>,
    survey_link: String,
    clinic_name: String,
}

impl SurveyDispatcher {
    pub fn new(config: &TwilioConfig, provider: Arc<dyn MessagingProvider>) -> Self {
        Self {
            provider,
            survey_link: config.survey_link.clone(),
            clinic_name: config.clinic_name.clone(),
        }
    }

    pub fn survey_url(&self, identity_key: &str) -> String {
        format!("{}&id={}", self.survey_link, identity_key)
    }

    pub fn message_body(&self, identity_key: &str, patient_name: &str) -> String {
        format!(
            "Hi {}, thank you for visiting us! We hope your recent appointment today with the {} was helpful. \
             Please take a moment to share your feedback anonymously in our short survey. \
             Your input helps us improve our services. Tap {} to start. Thank you!",
            title_case(patient_name),
            self.clinic_name,
            self.survey_url(identity_key)
        )
    }

    /// Returns the delivery id reported by the provider.
    #[instrument(skip(self, patient_name, patient_phone))]
    pub async fn send_survey(
        &self,
        identity_key: &str,
        patient_name: &str,
        patient_phone: &str,
    ) -> Result<String, DispatchError> {
        let to = to_e164(patient_phone).ok_or_else(|| DispatchError::MissingPhone {
            row_key: identity_key.to_string(),
        })?;

        let message = SmsMessage {
            to,
            body: self.message_body(identity_key, patient_name),
        };
        let sid = self.provider.send(&message).await?;

        info!("Survey sent with sid {}", sid);
        Ok(sid)
    }
}

/// Capitalises the first letter of every alphabetic run and lowercases the rest.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_word = false;
    for c in name.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// North American numbers only; anything else is treated as missing.
fn to_e164(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => Some(format!("+1{}", digits)),
        11 if digits.starts_with('1') => Some(format!("+{}", digits)),
        _ => None,
    }
}
