use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DOB_FORMAT: &str = "%Y-%m-%d";
pub const APPOINTMENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Placeholder date of birth for layouts that do not render one.
pub fn unknown_dob() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// One appointment row as scraped from the schedule page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub patient_name: String,
    pub patient_dob: NaiveDate,
    /// Digits only; empty when the page had no usable number.
    pub patient_phone: String,
    pub appointment_time: NaiveDateTime,
    pub appointment_status: String,
    pub provider: String,
    #[serde(rename = "type")]
    pub appointment_type: String,
}

impl Appointment {
    pub fn has_known_dob(&self) -> bool {
        self.patient_dob != unknown_dob()
    }
}

/// An appointment as persisted, keyed by its derived identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAppointment {
    pub row_key: String,
    pub partition_key: String,
    pub sent_on: Option<DateTime<Utc>>,
    pub message_sid: Option<String>,
    pub appointment: Appointment,
}

impl StoredAppointment {
    pub fn new(row_key: String, partition_key: String, appointment: Appointment) -> Self {
        Self {
            row_key,
            partition_key,
            sent_on: None,
            message_sid: None,
            appointment,
        }
    }

    pub fn survey_sent(&self) -> bool {
        self.sent_on.is_some()
    }
}

/// Business predicate selecting the visits that receive a survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyTarget {
    pub status: String,
    pub appointment_type: String,
    pub provider: String,
}

impl Default for SurveyTarget {
    fn default() -> Self {
        Self {
            status: "Seen".to_string(),
            appointment_type: "CLINICIAN".to_string(),
            provider: "BHUC COMMON GROUND".to_string(),
        }
    }
}

impl SurveyTarget {
    pub fn new(status: &str, appointment_type: &str, provider: &str) -> Self {
        Self {
            status: status.to_string(),
            appointment_type: appointment_type.to_string(),
            provider: provider.to_string(),
        }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        appointment.appointment_status == self.status
            && appointment.appointment_type == self.appointment_type
            && appointment.provider == self.provider
    }
}
