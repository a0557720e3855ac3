use chrono::NaiveDate;
use serde::Serialize;

use shared_models::Appointment;

pub const HEADING_PREFIXES: [&str; 2] = ["Schedule Standard view - ", "Schedule Agenda view - "];

pub const APPOINTMENTS_CONTAINER: &str = r#"div[data-element="appointments-table"]"#;
pub const PRINT_BUTTON: &str = r#"button[data-element="btn-schedule-print"]"#;
pub const PRINT_TABLE: &str = r#"table[data-element="table-agenda-print"]"#;
pub const PREVIOUS_DAY_BUTTON: &str = "button.decrement-date";
pub const DATE_PICKER_INPUT: &str = r#"input[data-element="schedule-date-picker"]"#;
pub const SCHEDULE_NAV_LINK: &str = r##"a[href*="#/PF/schedule"]"##;

/// Raw page content captured for one schedule date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePage {
    pub target_date: NaiveDate,
    pub html: String,
}

/// DOM shapes the schedule is known to render, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScheduleLayout {
    PrintTable,
    LiveTable,
}

impl ScheduleLayout {
    pub const PRIORITY: [ScheduleLayout; 2] = [ScheduleLayout::PrintTable, ScheduleLayout::LiveTable];
}

impl std::fmt::Display for ScheduleLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleLayout::PrintTable => write!(f, "print table"),
            ScheduleLayout::LiveTable => write!(f, "live table"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSchedule {
    pub schedule_date: NaiveDate,
    /// Layout the rows came from; `None` when neither produced any.
    pub layout: Option<ScheduleLayout>,
    pub appointments: Vec<Appointment>,
}

/// What a captured page looks like, for logs and HTML debug dumps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageDiagnosis {
    pub is_login_page: bool,
    pub is_mfa_page: bool,
    pub has_appointments_container: bool,
    pub has_print_table: bool,
    pub print_rows: usize,
    pub live_rows: usize,
    pub heading_date: Option<NaiveDate>,
}

impl std::fmt::Display for PageDiagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "login={} mfa={} container={} print_table={} print_rows={} live_rows={} heading_date={}",
            self.is_login_page,
            self.is_mfa_page,
            self.has_appointments_container,
            self.has_print_table,
            self.print_rows,
            self.live_rows,
            self.heading_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string())
        )
    }
}
