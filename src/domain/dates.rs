//! Date handling for spreadsheet cells.
//!
//! Numeric cells in the 1..=100000 range are spreadsheet day serials counted
//! from 1899-12-30. That epoch reproduces the 1900 leap-year bug of the
//! spreadsheet format: serials below 61 come out one day early compared to
//! what the spreadsheet displays. This is kept as-is so dates agree with other
//! tools reading the same files.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

use crate::domain::models::CellValue;

pub const SERIAL_MIN: f64 = 1.0;
pub const SERIAL_MAX: f64 = 100_000.0;

const TEXT_DATE_FORMATS: &[&str] = &["%d-%m-%Y", "%d/%m/%Y", "%d-%b-%Y", "%d %b %Y", "%b %d, %Y"];

/// Settings applied when turning raw cells into calendar dates.
#[derive(Debug, Clone, Copy)]
pub struct DateContext {
    /// Offset that instants carrying their own zone are shifted into before
    /// the calendar date is taken. Naive text and serials are never shifted.
    pub offset: FixedOffset,
}

impl DateContext {
    pub fn with_offset_minutes(minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }
}

impl Default for DateContext {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

pub fn is_serial(value: f64) -> bool {
    value.is_finite() && (SERIAL_MIN..=SERIAL_MAX).contains(&value)
}

/// Calendar date for a day serial; the fractional time of day is dropped.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !is_serial(serial) {
        return None;
    }
    epoch().checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Inverse of [`serial_to_date`], used to build fixtures and compare encodings.
pub fn date_to_serial(date: NaiveDate) -> i64 {
    (date - epoch()).num_days()
}

pub fn parse_text_date(text: &str, ctx: &DateContext) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&ctx.offset).date_naive());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.date());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.date());
    }

    TEXT_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

/// Date field conversion. Unparseable input yields `None`, never an error.
pub fn cell_to_date(cell: &CellValue, ctx: &DateContext) -> Option<NaiveDate> {
    match cell {
        CellValue::Number(n) => serial_to_date(*n),
        CellValue::Text(s) => parse_text_date(s, ctx),
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

/// Statement period conversion: serials render as `MMM-YY`, text is kept trimmed.
pub fn cell_to_period(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Number(n) => serial_to_date(*n).map(|d| d.format("%b-%y").to_string()),
        CellValue::Text(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}
