// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use shared_models::{Appointment, StoredAppointment, SurveyTarget, APPOINTMENT_TIME_FORMAT, DOB_FORMAT};

use crate::error::StoreError;

// ==============================================================================
// IDENTITY
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppointmentKey {
    pub row_key: String,
    pub partition_key: String,
}

// ==============================================================================
// TABLE ENTITY
// ==============================================================================

/// Row layout in the appointments table. Unset values are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentEntity {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    #[serde(rename = "RowKey")]
    pub row_key: String,
    #[serde(rename = "sentOn", default)]
    pub sent_on: String,
    #[serde(default)]
    pub message_sid: String,
    #[serde(rename = "patientName")]
    pub patient_name: String,
    #[serde(rename = "patientDOB")]
    pub patient_dob: String,
    #[serde(rename = "patientPhone", default)]
    pub patient_phone: String,
    #[serde(rename = "appointmentTime")]
    pub appointment_time: String,
    #[serde(rename = "appointmentStatus")]
    pub appointment_status: String,
    pub provider: String,
    #[serde(rename = "type")]
    pub appointment_type: String,
}

impl From<&StoredAppointment> for AppointmentEntity {
    fn from(record: &StoredAppointment) -> Self {
        let appt = &record.appointment;
        Self {
            partition_key: record.partition_key.clone(),
            row_key: record.row_key.clone(),
            sent_on: record
                .sent_on
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            message_sid: record.message_sid.clone().unwrap_or_default(),
            patient_name: appt.patient_name.clone(),
            patient_dob: appt.patient_dob.format(DOB_FORMAT).to_string(),
            patient_phone: appt.patient_phone.clone(),
            appointment_time: appt.appointment_time.format(APPOINTMENT_TIME_FORMAT).to_string(),
            appointment_status: appt.appointment_status.clone(),
            provider: appt.provider.clone(),
            appointment_type: appt.appointment_type.clone(),
        }
    }
}

impl TryFrom<AppointmentEntity> for StoredAppointment {
    type Error = StoreError;

    fn try_from(entity: AppointmentEntity) -> Result<Self, Self::Error> {
        let invalid = |field: &str, value: &str| {
            StoreError::InvalidRecord(format!("{} '{}' on {}", field, value, entity.row_key))
        };

        let patient_dob = NaiveDate::parse_from_str(&entity.patient_dob, DOB_FORMAT)
            .map_err(|_| invalid("patientDOB", &entity.patient_dob))?;
        let appointment_time = NaiveDateTime::parse_from_str(&entity.appointment_time, APPOINTMENT_TIME_FORMAT)
            .map_err(|_| invalid("appointmentTime", &entity.appointment_time))?;
        let sent_on = match entity.sent_on.as_str() {
            "" => None,
            raw => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|_| invalid("sentOn", raw))?
                    .with_timezone(&Utc),
            ),
        };
        let message_sid = Some(entity.message_sid.clone()).filter(|sid| !sid.is_empty());

        Ok(StoredAppointment {
            row_key: entity.row_key,
            partition_key: entity.partition_key,
            sent_on,
            message_sid,
            appointment: Appointment {
                patient_name: entity.patient_name,
                patient_dob,
                patient_phone: entity.patient_phone,
                appointment_time,
                appointment_status: entity.appointment_status,
                provider: entity.provider,
                appointment_type: entity.appointment_type,
            },
        })
    }
}

// ==============================================================================
// QUERIES
// ==============================================================================

/// Records of the target visit kind that have not been surveyed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSurveyQuery {
    pub target: SurveyTarget,
}

impl PendingSurveyQuery {
    pub fn new(target: SurveyTarget) -> Self {
        Self { target }
    }

    pub fn to_odata_filter(&self) -> String {
        format!(
            "appointmentStatus eq '{}' and provider eq '{}' and type eq '{}' and sentOn eq ''",
            quote(&self.target.status),
            quote(&self.target.provider),
            quote(&self.target.appointment_type)
        )
    }

    pub fn matches(&self, record: &StoredAppointment) -> bool {
        !record.survey_sent() && self.target.matches(&record.appointment)
    }
}

impl Default for PendingSurveyQuery {
    fn default() -> Self {
        Self::new(SurveyTarget::default())
    }
}

fn quote(value: &str) -> String {
    value.replace('\'', "''")
}
