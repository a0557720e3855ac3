//! Extraction of appointments from captured schedule HTML.
//!
//! The schedule date comes from the page heading and is applied to every
//! row. Layouts are tried in [`ScheduleLayout::PRIORITY`] order and the
//! first one that yields rows wins.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use shared_models::{unknown_dob, Appointment};

use crate::error::ParseError;
use crate::models::{ParsedSchedule, ScheduleLayout, APPOINTMENTS_CONTAINER, HEADING_PREFIXES, PRINT_TABLE};

struct CellSelectors {
    status: &'static str,
    patient: &'static str,
    time: &'static str,
    provider: &'static str,
    kind: &'static str,
    dob: Option<&'static str>,
    phone: Option<&'static str>,
}

const PATIENT_DOB_SLOT: usize = 1;
const PATIENT_PHONE_SLOT: usize = 3;
const CONTACT_DETAILS: &str = ".contact-details";

const PRINT_CELLS: CellSelectors = CellSelectors {
    status: r#"td.status-column, td[data-element="td-intake-status"]"#,
    patient: r#"td.patient-column, td[data-element="td-patient-name"]"#,
    time: r#"td.time-column, td[data-element="td-appointment-time"]"#,
    provider: r#"td.provider-column, td[data-element="td-provider-name"]"#,
    kind: r#"td.type-column, td[data-element="td-appointment-type"]"#,
    dob: None,
    phone: None,
};

const LIVE_CELLS: CellSelectors = CellSelectors {
    status: r#"[data-element="appointment-status"]"#,
    patient: r#"[data-element="patient-name"]"#,
    time: r#"[data-element="appointment-time"]"#,
    provider: r#"[data-element="provider-name"]"#,
    kind: r#"[data-element="appointment-type"]"#,
    dob: Some(r#"[data-element="patient-dob"]"#),
    phone: Some(r#"[data-element="patient-phone"]"#),
};

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::Selector(css.to_string()))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses every appointment on the page.
pub fn parse(html: &str) -> Result<Vec<Appointment>, ParseError> {
    parse_schedule(html).map(|schedule| schedule.appointments)
}

pub fn parse_schedule(html: &str) -> Result<ParsedSchedule, ParseError> {
    let document = Html::parse_document(html);
    let schedule_date = heading_date(&document)?;

    for layout in ScheduleLayout::PRIORITY {
        let appointments = parse_rows(&document, layout, schedule_date)?;
        if !appointments.is_empty() {
            debug!("Parsed {} appointments from the {}", appointments.len(), layout);
            return Ok(ParsedSchedule {
                schedule_date,
                layout: Some(layout),
                appointments,
            });
        }
        debug!("No appointments in the {}", layout);
    }

    Ok(ParsedSchedule {
        schedule_date,
        layout: None,
        appointments: Vec::new(),
    })
}

/// Parses a single layout with no fallback.
pub fn parse_with_layout(html: &str, layout: ScheduleLayout) -> Result<Vec<Appointment>, ParseError> {
    let document = Html::parse_document(html);
    let schedule_date = heading_date(&document)?;
    parse_rows(&document, layout, schedule_date)
}

pub fn parse_schedule_date(html: &str) -> Result<NaiveDate, ParseError> {
    heading_date(&Html::parse_document(html))
}

pub(crate) fn heading_date(document: &Html) -> Result<NaiveDate, ParseError> {
    let headings = selector("h1, h2, h3, h4")?;

    for heading in document.select(&headings) {
        let text = collapse_whitespace(&heading.text().collect::<String>());
        if let Some(raw) = HEADING_PREFIXES.iter().find_map(|prefix| text.strip_prefix(prefix)) {
            return parse_heading_date(raw);
        }
    }

    Err(ParseError::MissingHeading)
}

/// Accepts "Thursday, January 02, 2025" with or without the comma after
/// the month.
fn parse_heading_date(raw: &str) -> Result<NaiveDate, ParseError> {
    let normalized = collapse_whitespace(&raw.replace(',', " "));
    NaiveDate::parse_from_str(&normalized, "%A %B %d %Y")
        .map_err(|_| ParseError::InvalidHeadingDate(raw.trim().to_string()))
}

pub(crate) fn rows<'a>(document: &'a Html, layout: ScheduleLayout) -> Result<Vec<ElementRef<'a>>, ParseError> {
    let table = match layout {
        ScheduleLayout::PrintTable => selector(PRINT_TABLE)?,
        ScheduleLayout::LiveTable => selector(APPOINTMENTS_CONTAINER)?,
    };
    let row = selector("tr")?;
    let data_cell = selector("td")?;

    Ok(document
        .select(&table)
        .flat_map(|t| t.select(&row).collect::<Vec<_>>())
        // Header rows carry only <th> cells
        .filter(|r| r.select(&data_cell).next().is_some())
        .collect())
}

fn parse_rows(
    document: &Html,
    layout: ScheduleLayout,
    schedule_date: NaiveDate,
) -> Result<Vec<Appointment>, ParseError> {
    let cells = match layout {
        ScheduleLayout::PrintTable => &PRINT_CELLS,
        ScheduleLayout::LiveTable => &LIVE_CELLS,
    };
    let time_pattern = time_pattern()?;

    let mut appointments = Vec::new();
    for (index, row) in rows(document, layout)?.into_iter().enumerate() {
        match parse_row(row, cells, schedule_date, &time_pattern)? {
            Ok(appointment) => appointments.push(appointment),
            Err(reason) => warn!("Skipping {} row {}: {}", layout, index + 1, reason),
        }
    }
    Ok(appointments)
}

fn time_pattern() -> Result<Regex, ParseError> {
    Regex::new(r"(\d{1,2}):(\d{2})\s*([AaPp])\.?\s*[Mm]")
        .map_err(|e| ParseError::Selector(e.to_string()))
}

fn cell_text(row: ElementRef<'_>, css: &str) -> Result<Option<String>, ParseError> {
    let cell = selector(css)?;
    Ok(row
        .select(&cell)
        .next()
        .map(|c| collapse_whitespace(&c.text().collect::<String>())))
}

fn digits(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

/// Slots of the patient cell: one per child element when the cell is
/// structured, otherwise one per line. Empty slots keep their position.
fn patient_slots(cell: ElementRef<'_>) -> Vec<String> {
    let children: Vec<String> = cell
        .children()
        .filter_map(ElementRef::wrap)
        .map(|child| collapse_whitespace(&child.text().collect::<String>()))
        .collect();
    if !children.is_empty() {
        return children;
    }

    let text = cell.text().collect::<String>();
    text.trim().split('\n').map(collapse_whitespace).collect()
}

/// Outer error aborts the page; inner error skips the row.
fn parse_row(
    row: ElementRef<'_>,
    cells: &CellSelectors,
    schedule_date: NaiveDate,
    time_pattern: &Regex,
) -> Result<Result<Appointment, String>, ParseError> {
    let required = |css: &str, field: &str| -> Result<Result<String, String>, ParseError> {
        Ok(match cell_text(row, css)? {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(format!("missing {}", field)),
        })
    };

    let status = match required(cells.status, "status")? {
        Ok(v) => v,
        Err(reason) => return Ok(Err(reason)),
    };
    let time_text = match required(cells.time, "time")? {
        Ok(v) => v,
        Err(reason) => return Ok(Err(reason)),
    };
    let provider = match required(cells.provider, "provider")? {
        Ok(v) => v,
        Err(reason) => return Ok(Err(reason)),
    };
    let kind = match required(cells.kind, "type")? {
        Ok(v) => v,
        Err(reason) => return Ok(Err(reason)),
    };
    let patient_cell = selector(cells.patient)?;
    let Some(cell) = row.select(&patient_cell).next() else {
        return Ok(Err("missing patient".to_string()));
    };

    let Some(time) = parse_time(&time_text, time_pattern) else {
        return Ok(Err(format!("unreadable time '{}'", time_text)));
    };

    let mut patient = match parse_patient_lines(&patient_slots(cell)) {
        Ok(patient) => patient,
        Err(reason) => return Ok(Err(reason)),
    };
    let contact = selector(CONTACT_DETAILS)?;
    if let Some(details) = cell.select(&contact).next() {
        patient.phone = digits(&details.text().collect::<String>());
    }
    if let Some(css) = cells.dob {
        if let Some(dob) = cell_text(row, css)?.as_deref().and_then(parse_dob) {
            patient.dob = dob;
        }
    }
    if let Some(css) = cells.phone {
        if let Some(phone) = cell_text(row, css)? {
            patient.phone = digits(&phone);
        }
    }

    Ok(Ok(Appointment {
        patient_name: patient.name,
        patient_dob: patient.dob,
        patient_phone: patient.phone,
        appointment_time: NaiveDateTime::new(schedule_date, time),
        appointment_status: status,
        provider,
        appointment_type: kind,
    }))
}

struct PatientFields {
    name: String,
    dob: NaiveDate,
    phone: String,
}

/// Print layout order: name, DOB, age and sex, phone. The name must be
/// present and must not be a date or a number; DOB and phone fall back to
/// the unknown sentinel and an empty string. The phone keeps every digit.
fn parse_patient_lines(lines: &[String]) -> Result<PatientFields, String> {
    let name = lines.first().map(String::as_str).unwrap_or_default();
    if name.is_empty() {
        return Err("missing patient name".to_string());
    }
    if !name.chars().any(char::is_alphabetic) {
        return Err(format!("patient name '{}' is not a name", name));
    }

    let dob = lines
        .get(PATIENT_DOB_SLOT)
        .and_then(|line| parse_dob(line))
        .unwrap_or_else(unknown_dob);
    let phone = lines
        .get(PATIENT_PHONE_SLOT)
        .map(|line| digits(line))
        .unwrap_or_default();

    Ok(PatientFields {
        name: name.to_string(),
        dob,
        phone,
    })
}

fn parse_dob(text: &str) -> Option<NaiveDate> {
    let cleaned: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '/').collect();
    if cleaned.matches('/').count() != 2 {
        return None;
    }
    NaiveDate::parse_from_str(&cleaned, "%m/%d/%Y").ok()
}

/// First `H:MM AM` style time in the cell; ranges keep their start.
fn parse_time(text: &str, pattern: &Regex) -> Option<NaiveTime> {
    let captures = pattern.captures(text)?;
    let normalized = format!(
        "{}:{} {}M",
        &captures[1],
        &captures[2],
        captures[3].to_ascii_uppercase()
    );
    NaiveTime::parse_from_str(&normalized, "%I:%M %p").ok()
}
