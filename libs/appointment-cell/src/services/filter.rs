use shared_models::{Appointment, SurveyTarget};

/// Keeps the appointments that qualify for a survey, in their original order.
pub fn filter_for_survey(appointments: Vec<Appointment>, target: &SurveyTarget) -> Vec<Appointment> {
    appointments
        .into_iter()
        .filter(|appt| target.matches(appt))
        .collect()
}
