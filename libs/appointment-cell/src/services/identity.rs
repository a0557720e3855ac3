use chrono::{NaiveDate, NaiveDateTime};
use md5::{Digest, Md5};
use uuid::Uuid;

use shared_models::{Appointment, APPOINTMENT_TIME_FORMAT, DOB_FORMAT};

use crate::error::KeyError;
use crate::models::AppointmentKey;

/// Derives the stable identity of an appointment.
///
/// The digest input is `dob + second name token + phone + time`, hashed with
/// MD5 and rendered as a hyphenated UUID. The partition key is the last
/// character of that string. The "last name" is literally the second
/// whitespace token of the displayed name, which keeps keys compatible with
/// records already in the table.
pub fn compute_key(
    patient_dob: NaiveDate,
    patient_name: &str,
    patient_phone: &str,
    appointment_time: NaiveDateTime,
) -> Result<AppointmentKey, KeyError> {
    let last_name = patient_name
        .split_whitespace()
        .nth(1)
        .ok_or(KeyError::MissingLastName)?;

    let phone: String = patient_phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let material = format!(
        "{}{}{}{}",
        patient_dob.format(DOB_FORMAT),
        last_name,
        phone,
        appointment_time.format(APPOINTMENT_TIME_FORMAT)
    );

    let digest: [u8; 16] = Md5::digest(material.as_bytes()).into();
    let row_key = Uuid::from_bytes(digest).hyphenated().to_string();
    let partition_key = row_key
        .chars()
        .last()
        .map(String::from)
        .unwrap_or_default();

    Ok(AppointmentKey { row_key, partition_key })
}

pub fn key_for(appointment: &Appointment) -> Result<AppointmentKey, KeyError> {
    compute_key(
        appointment.patient_dob,
        &appointment.patient_name,
        &appointment.patient_phone,
        appointment.appointment_time,
    )
}
