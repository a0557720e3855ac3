use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub practice_fusion: PracticeFusionConfig,
    pub callharbor: CallHarborConfig,
    pub twilio: TwilioConfig,
    pub storage: StorageConfig,
    pub browser: BrowserConfig,
    pub run: RunConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            practice_fusion: PracticeFusionConfig::from_env(),
            callharbor: CallHarborConfig::from_env(),
            twilio: TwilioConfig::from_env(),
            storage: StorageConfig::from_env(),
            browser: BrowserConfig::from_env(),
            run: RunConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        self.practice_fusion.is_configured()
            && self.callharbor.is_configured()
            && self.storage.is_configured()
    }

    pub fn is_sms_configured(&self) -> bool {
        self.twilio.is_configured()
    }
}

/// EHR scheduling site. Routes are URL fragments appended to `base_url`.
#[derive(Debug, Clone)]
pub struct PracticeFusionConfig {
    pub username: String,
    pub password: String,
    pub base_url: String,
    pub login_route: String,
    pub schedule_route: String,
    /// Fragment prefix shared by every authenticated route.
    pub authenticated_route: String,
    /// Fragment of the dedicated security-check (MFA) page.
    pub mfa_route: String,
    pub wait_timeout: Duration,
    pub auth_timeout: Duration,
    pub mfa_settle_delay: Duration,
    pub page_settle_delay: Duration,
    pub day_step_delay: Duration,
    pub poll_interval: Duration,
    pub navigation_attempts: u32,
    pub print_attempts: u32,
}

impl PracticeFusionConfig {
    pub fn from_env() -> Self {
        Self {
            username: required("PRACTICEFUSION_USERNAME"),
            password: required("PRACTICEFUSION_PASSWORD"),
            base_url: with_default(
                "PRACTICEFUSION_BASE_URL",
                "https://static.practicefusion.com/apps/ehr/index.html",
            ),
            login_route: "#/login".to_string(),
            schedule_route: "#/PF/schedule/scheduler/agenda".to_string(),
            authenticated_route: "#/PF/".to_string(),
            mfa_route: "#/security-check".to_string(),
            wait_timeout: seconds("PRACTICEFUSION_WAIT_TIMEOUT_SECS", 20),
            auth_timeout: seconds("PRACTICEFUSION_AUTH_TIMEOUT_SECS", 20),
            mfa_settle_delay: Duration::from_secs(5),
            page_settle_delay: Duration::from_secs(5),
            day_step_delay: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
            navigation_attempts: 3,
            print_attempts: 3,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url, self.login_route)
    }

    pub fn schedule_url(&self) -> String {
        format!("{}{}", self.base_url, self.schedule_route)
    }
}

/// Messaging portal that receives the EHR's one-time codes.
#[derive(Debug, Clone)]
pub struct CallHarborConfig {
    pub username: String,
    pub password: String,
    /// Base32 TOTP secret for the portal's own MFA step.
    pub mfa_secret: String,
    pub base_url: String,
    pub code_wait_timeout: Duration,
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
}

impl CallHarborConfig {
    pub fn from_env() -> Self {
        Self {
            username: required("CALLHARBOR_USERNAME"),
            password: required("CALLHARBOR_PASSWORD"),
            mfa_secret: required("CALLHARBOR_MFA_SECRET"),
            base_url: with_default("CALLHARBOR_BASE_URL", "https://control.callharbor.com"),
            code_wait_timeout: seconds("CALLHARBOR_CODE_WAIT_SECS", 60),
            poll_interval: Duration::from_secs(5),
            wait_timeout: Duration::from_secs(10),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty() && !self.mfa_secret.is_empty()
    }

    pub fn messages_url(&self) -> String {
        format!("{}/portal/messages", self.base_url)
    }
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Messaging service (campaign) the survey is sent from.
    pub campaign_sid: String,
    pub survey_link: String,
    pub api_base_url: String,
    pub clinic_name: String,
}

impl TwilioConfig {
    pub fn from_env() -> Self {
        Self {
            account_sid: required("TWILIO_ACCOUNT_SID"),
            auth_token: required("TWILIO_AUTH_TOKEN"),
            campaign_sid: required("TWILIO_CAMPAIGN_SID"),
            survey_link: required("TWILIO_SURVEY_LINK"),
            api_base_url: with_default("TWILIO_API_BASE_URL", "https://api.twilio.com"),
            clinic_name: with_default("SURVEY_CLINIC_NAME", "BHUC clinic"),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty()
            && !self.auth_token.is_empty()
            && !self.campaign_sid.is_empty()
            && !self.survey_link.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStateBackend {
    Blob,
    File,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub connection_string: String,
    pub appointments_table: String,
    pub session_state_container: String,
    pub session_state_backend: SessionStateBackend,
    pub session_state_dir: PathBuf,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let backend = match env::var("SESSION_STATE_BACKEND").as_deref() {
            Ok("file") => SessionStateBackend::File,
            Ok("blob") | Err(_) => SessionStateBackend::Blob,
            Ok(other) => {
                warn!("Unknown SESSION_STATE_BACKEND '{}', using blob", other);
                SessionStateBackend::Blob
            }
        };

        Self {
            connection_string: required("STORAGE_ACCOUNT_CONNECTION_STRING"),
            appointments_table: with_default("APPOINTMENTS_TABLE", "appointments"),
            session_state_container: with_default("SESSION_STATE_CONTAINER", "browser-session-state"),
            session_state_backend: backend,
            session_state_dir: PathBuf::from(with_default("SESSION_STATE_DIR", ".session-state")),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.connection_string.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
    /// When set, every captured schedule page is written here.
    pub html_debug_dir: Option<PathBuf>,
}

impl BrowserConfig {
    pub fn from_env() -> Self {
        Self {
            webdriver_url: with_default("WEBDRIVER_URL", "http://localhost:4444"),
            // Anything other than an explicit FALSE keeps the browser headless
            headless: env::var("HEADLESS").map(|v| v != "FALSE").unwrap_or(true),
            window_width: 1920,
            window_height: 1080,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3".to_string(),
            html_debug_dir: env::var("HTML_DEBUG_DIR").ok().filter(|v| !v.is_empty()).map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Schedule date to scrape; `None` means today.
    pub target_date: Option<NaiveDate>,
    pub target_provider: String,
    pub target_appointment_type: String,
    pub target_status: String,
}

impl RunConfig {
    pub fn from_env() -> Self {
        let target_date = match env::var("TARGET_DATE") {
            Ok(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    warn!("Invalid TARGET_DATE format '{}', using current date", raw);
                    None
                }
            },
            Err(_) => None,
        };

        Self {
            target_date,
            target_provider: with_default("TARGET_PROVIDER", "BHUC COMMON GROUND"),
            target_appointment_type: with_default("TARGET_APPOINTMENT_TYPE", "CLINICIAN"),
            target_status: with_default("TARGET_STATUS", "Seen"),
        }
    }
}

fn required(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", name);
        String::new()
    })
}

fn with_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn seconds(name: &str, default: u64) -> Duration {
    let secs = match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a number of seconds, using default {}", name, default);
            default
        }),
        Err(_) => default,
    };
    Duration::from_secs(secs)
}
