use scraper::{Html, Selector};

use crate::models::{PageDiagnosis, ScheduleLayout, APPOINTMENTS_CONTAINER, PRINT_TABLE};
use crate::services::parser::{heading_date, rows};

fn present(document: &Html, css: &str) -> bool {
    Selector::parse(css)
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false)
}

/// Classifies a captured page. Never fails; unknown parts read as absent.
pub fn diagnose_page(html: &str) -> PageDiagnosis {
    let document = Html::parse_document(html);

    PageDiagnosis {
        is_login_page: present(&document, "#inputUsername") || present(&document, "#loginButton"),
        is_mfa_page: present(&document, "#sendCallButton") || present(&document, "#sendCodeButton"),
        has_appointments_container: present(&document, APPOINTMENTS_CONTAINER),
        has_print_table: present(&document, PRINT_TABLE),
        print_rows: rows(&document, ScheduleLayout::PrintTable).map(|r| r.len()).unwrap_or(0),
        live_rows: rows(&document, ScheduleLayout::LiveTable).map(|r| r.len()).unwrap_or(0),
        heading_date: heading_date(&document).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared_utils::test_utils::{print_schedule_page, FixtureRow};

    #[test]
    fn test_diagnoses_print_page() {
        let html = print_schedule_page(
            "Thursday, January 02, 2025",
            &[FixtureRow::seen("DOE JANE", "10:30 AM"), FixtureRow::seen("ROE RICK", "11:00 AM")],
        );

        let diagnosis = diagnose_page(&html);
        assert!(diagnosis.has_print_table);
        assert!(diagnosis.has_appointments_container);
        assert_eq!(diagnosis.print_rows, 2);
        assert_eq!(diagnosis.live_rows, 0);
        assert_eq!(diagnosis.heading_date, NaiveDate::from_ymd_opt(2025, 1, 2));
        assert!(!diagnosis.is_login_page);
    }

    #[test]
    fn test_diagnoses_login_page() {
        let html = r#"<html><body><input id="inputUsername"><input id="inputPswd"><button id="loginButton">Log in</button></body></html>"#;

        let diagnosis = diagnose_page(html);
        assert!(diagnosis.is_login_page);
        assert_eq!(diagnosis.heading_date, None);
        assert!(diagnosis.to_string().contains("login=true"));
    }
}
