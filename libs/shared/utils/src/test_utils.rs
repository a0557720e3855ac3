//! Fixtures shared by the cells' test suites.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};

use shared_config::{
    AppConfig, BrowserConfig, CallHarborConfig, PracticeFusionConfig, RunConfig,
    SessionStateBackend, StorageConfig, TwilioConfig,
};
use shared_models::Appointment;

pub const TEST_ACCOUNT: &str = "devstoreaccount1";
/// Base64 of a throwaway key; only ever checked by mock servers.
pub const TEST_ACCOUNT_KEY: &str = "dGVzdC1hY2NvdW50LWtleS1mb3ItbW9jay1zZXJ2ZXJz";

pub const PF_BASE_URL: &str = "https://ehr.test/index.html";
pub const CH_BASE_URL: &str = "https://portal.test";

pub struct TestConfig {
    pub mock_uri: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            mock_uri: "http://localhost:10002".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_mock_uri(mock_uri: &str) -> Self {
        Self {
            mock_uri: mock_uri.to_string(),
        }
    }

    pub fn connection_string(&self) -> String {
        format!(
            "DefaultEndpointsProtocol=http;AccountName={account};AccountKey={key};TableEndpoint={uri}/{account};BlobEndpoint={uri}/{account}",
            account = TEST_ACCOUNT,
            key = TEST_ACCOUNT_KEY,
            uri = self.mock_uri,
        )
    }

    pub fn practice_fusion(&self) -> PracticeFusionConfig {
        PracticeFusionConfig {
            username: "pf-user".to_string(),
            password: "pf-pass".to_string(),
            base_url: PF_BASE_URL.to_string(),
            login_route: "#/login".to_string(),
            schedule_route: "#/PF/schedule/scheduler/agenda".to_string(),
            authenticated_route: "#/PF/".to_string(),
            mfa_route: "#/security-check".to_string(),
            wait_timeout: Duration::from_millis(20),
            auth_timeout: Duration::from_millis(50),
            mfa_settle_delay: Duration::ZERO,
            page_settle_delay: Duration::ZERO,
            day_step_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(5),
            navigation_attempts: 2,
            print_attempts: 2,
        }
    }

    pub fn callharbor(&self) -> CallHarborConfig {
        CallHarborConfig {
            username: "sms@clinic".to_string(),
            password: "ch-pass".to_string(),
            // RFC 6238 reference secret "12345678901234567890"
            mfa_secret: "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ".to_string(),
            base_url: CH_BASE_URL.to_string(),
            code_wait_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            wait_timeout: Duration::from_millis(20),
        }
    }

    pub fn twilio(&self) -> TwilioConfig {
        TwilioConfig {
            account_sid: "AC-test".to_string(),
            auth_token: "twilio-token".to_string(),
            campaign_sid: "MG-test".to_string(),
            survey_link: "https://survey.test/s?form=hope".to_string(),
            api_base_url: self.mock_uri.clone(),
            clinic_name: "BHUC clinic".to_string(),
        }
    }

    pub fn storage(&self) -> StorageConfig {
        StorageConfig {
            connection_string: self.connection_string(),
            appointments_table: "appointments".to_string(),
            session_state_container: "browser-session-state".to_string(),
            session_state_backend: SessionStateBackend::Blob,
            session_state_dir: PathBuf::from(".session-state"),
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            practice_fusion: self.practice_fusion(),
            callharbor: self.callharbor(),
            twilio: self.twilio(),
            storage: self.storage(),
            browser: BrowserConfig {
                webdriver_url: "http://localhost:4444".to_string(),
                headless: true,
                window_width: 1920,
                window_height: 1080,
                user_agent: "test-agent".to_string(),
                html_debug_dir: None,
            },
            run: RunConfig {
                target_date: None,
                target_provider: "BHUC COMMON GROUND".to_string(),
                target_appointment_type: "CLINICIAN".to_string(),
                target_status: "Seen".to_string(),
            },
        }
    }
}

/// One schedule row rendered by the fixture pages.
#[derive(Debug, Clone)]
pub struct FixtureRow {
    pub status: String,
    pub name: String,
    pub dob: String,
    pub phone: String,
    pub time: String,
    pub provider: String,
    pub kind: String,
}

impl FixtureRow {
    pub fn seen(name: &str, time: &str) -> Self {
        Self {
            status: "Seen".to_string(),
            name: name.to_string(),
            dob: "01/02/1990".to_string(),
            phone: "(555) 123-4567".to_string(),
            time: time.to_string(),
            provider: "BHUC COMMON GROUND".to_string(),
            kind: "CLINICIAN".to_string(),
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = phone.to_string();
        self
    }

    pub fn with_dob(mut self, dob: &str) -> Self {
        self.dob = dob.to_string();
        self
    }
}

pub fn schedule_heading(date: &str) -> String {
    format!("<h3>Schedule Standard view - {}</h3>", date)
}

fn print_row(row: &FixtureRow) -> String {
    format!(
        r#"<tr>
  <td class="status-column" data-element="td-intake-status">{status}</td>
  <td class="patient-column" data-element="td-patient-name">
    <div>{name}</div>
    <div>{dob}</div>
    <div>34 yrs F</div>
    <div class="contact-details"><div>{phone}</div></div>
  </td>
  <td class="time-column" data-element="td-appointment-time">{time}</td>
  <td class="provider-column" data-element="td-provider-name">{provider}</td>
  <td class="type-column" data-element="td-appointment-type">{kind}</td>
</tr>"#,
        status = row.status,
        name = row.name,
        dob = row.dob,
        phone = row.phone,
        time = row.time,
        provider = row.provider,
        kind = row.kind,
    )
}

fn live_row(row: &FixtureRow) -> String {
    format!(
        r#"<tr data-element="appointment-row">
  <td data-element="appointment-status">{status}</td>
  <td data-element="patient-name">{name}</td>
  <td data-element="appointment-time">{time} - 11:59 PM</td>
  <td data-element="provider-name">{provider}</td>
  <td data-element="appointment-type">{kind}</td>
</tr>"#,
        status = row.status,
        name = row.name,
        time = row.time,
        provider = row.provider,
        kind = row.kind,
    )
}

/// Print/agenda view with its header row followed by `rows`.
pub fn print_table(rows: &[FixtureRow]) -> String {
    let body: String = rows.iter().map(print_row).collect();
    format!(
        r#"<table data-element="table-agenda-print">
<tr><th>Status</th><th>Patient</th><th>Time</th><th>Provider</th><th>Type</th></tr>
{}
</table>"#,
        body
    )
}

/// Live appointments table; it never renders DOB or phone.
pub fn live_table(rows: &[FixtureRow]) -> String {
    let body: String = rows.iter().map(live_row).collect();
    format!(
        r#"<div data-element="appointments-table"><table><tbody>
<tr><th>Status</th><th>Patient</th><th>Time</th><th>Provider</th><th>Type</th></tr>
{}
</tbody></table></div>"#,
        body
    )
}

pub fn print_schedule_page(heading_date: &str, rows: &[FixtureRow]) -> String {
    format!(
        "<html><head><title>Schedule</title></head><body>{}{}{}</body></html>",
        schedule_heading(heading_date),
        live_table(&[]),
        print_table(rows)
    )
}

pub fn live_schedule_page(heading_date: &str, rows: &[FixtureRow]) -> String {
    format!(
        "<html><head><title>Schedule</title></head><body>{}{}{}</body></html>",
        schedule_heading(heading_date),
        live_table(rows),
        print_table(&[])
    )
}

pub fn appointment(name: &str, date: NaiveDate, hour: u32, minute: u32) -> Appointment {
    Appointment {
        patient_name: name.to_string(),
        patient_dob: NaiveDate::from_ymd_opt(1990, 1, 2).unwrap_or(NaiveDate::MIN),
        patient_phone: "5551234567".to_string(),
        appointment_time: date.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)),
        appointment_status: "Seen".to_string(),
        provider: "BHUC COMMON GROUND".to_string(),
        appointment_type: "CLINICIAN".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_points_storage_at_mock() {
        let config = TestConfig::with_mock_uri("http://127.0.0.1:9999").to_app_config();
        assert!(config.storage.connection_string.contains("TableEndpoint=http://127.0.0.1:9999/devstoreaccount1"));
        assert_eq!(config.twilio.api_base_url, "http://127.0.0.1:9999");
        assert!(config.is_configured());
    }

    #[test]
    fn test_print_page_contains_markers() {
        let page = print_schedule_page("Thursday, January 02, 2025", &[FixtureRow::seen("DOE JANE", "10:30 AM")]);
        assert!(page.contains("table-agenda-print"));
        assert!(page.contains("Schedule Standard view - Thursday, January 02, 2025"));
        assert!(page.contains("DOE JANE"));
    }
}
