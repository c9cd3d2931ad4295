//! Tolerant matching of column headers and sheet names.
//!
//! Headers resolve in three passes: exact (after trimming), case-insensitive,
//! then on a key that keeps only letters and digits. A pass that yields more
//! than one candidate is reported as ambiguous instead of guessing.

use regex::Regex;

use crate::domain::error::SheetError;
use crate::domain::models::{RawSheet, Workbook, WorkbookSource};

/// Lower-cased alphanumeric projection of a header, e.g. `PNR/Ticket #` → `pnrticket`.
pub fn header_key(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Finds the header in `headers` that stands for `wanted`.
pub fn resolve_header<'a>(
    headers: &'a [String],
    wanted: &str,
    sheet: &str,
) -> Result<Option<&'a str>, SheetError> {
    let wanted_trimmed = wanted.trim();

    if let Some(exact) = headers.iter().find(|h| h.trim() == wanted_trimmed) {
        return Ok(Some(exact.as_str()));
    }

    let caseless: Vec<&String> = headers
        .iter()
        .filter(|h| h.trim().eq_ignore_ascii_case(wanted_trimmed))
        .collect();
    if let Some(found) = single_candidate(caseless, wanted, sheet)? {
        return Ok(Some(found));
    }

    let wanted_key = header_key(wanted_trimmed);
    if wanted_key.is_empty() {
        return Ok(None);
    }
    let loose: Vec<&String> = headers.iter().filter(|h| header_key(h) == wanted_key).collect();
    single_candidate(loose, wanted, sheet)
}

fn single_candidate<'a>(
    candidates: Vec<&'a String>,
    wanted: &str,
    sheet: &str,
) -> Result<Option<&'a str>, SheetError> {
    match candidates.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(only.as_str())),
        many => Err(SheetError::AmbiguousColumn {
            sheet: sheet.to_string(),
            column: wanted.to_string(),
            candidates: many.iter().map(|h| h.to_string()).collect(),
        }),
    }
}

/// Like [`resolve_header`] but a missing header is an error.
pub fn require_header<'a>(headers: &'a [String], wanted: &str, sheet: &str) -> Result<&'a str, SheetError> {
    resolve_header(headers, wanted, sheet)?.ok_or_else(|| SheetError::ColumnNotFound {
        sheet: sheet.to_string(),
        column: wanted.to_string(),
    })
}

/// Selects a sheet by name. `pattern` is matched case-insensitively; `label`
/// is what the user is told to look for when nothing matches.
#[derive(Debug, Clone)]
pub struct SheetRule {
    pub label: String,
    pattern: Regex,
}

impl SheetRule {
    pub fn new(label: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!("(?i){pattern}"))?;
        Ok(Self {
            label: label.into(),
            pattern,
        })
    }

    pub fn matches(&self, sheet_name: &str) -> bool {
        self.pattern.is_match(sheet_name.trim())
    }

    /// Delimited text has a single anonymous sheet, which satisfies any rule.
    pub fn locate<'w>(&self, workbook: &'w Workbook) -> Result<&'w RawSheet, SheetError> {
        let found = match workbook.source {
            WorkbookSource::DelimitedText => workbook.sheets.first(),
            WorkbookSource::Spreadsheet => workbook.sheets.iter().find(|s| self.matches(&s.name)),
        };
        found.ok_or_else(|| SheetError::SheetNotFound {
            expected: self.label.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_header_wins_over_looser_matches() {
        let hs = headers(&["pnr_no", "PNR_NO"]);
        assert_eq!(resolve_header(&hs, "PNR_NO", "s").unwrap(), Some("PNR_NO"));
    }

    #[test]
    fn tolerates_case_whitespace_and_punctuation() {
        let hs = headers(&["S. No.", " pnr / ticket # ", "Total Amount"]);
        assert_eq!(
            resolve_header(&hs, "PNR/Ticket #", "Bookings").unwrap(),
            Some(" pnr / ticket # ")
        );
        let hs = headers(&["Pnr No"]);
        assert_eq!(resolve_header(&hs, "PNR_NO", "BOOKING").unwrap(), Some("Pnr No"));
    }

    #[test]
    fn ambiguous_loose_match_is_an_error() {
        let hs = headers(&["PNR No", "pnr-no"]);
        let err = resolve_header(&hs, "PNR_NO", "BOOKING").unwrap_err();
        assert!(matches!(err, SheetError::AmbiguousColumn { .. }));
    }

    #[test]
    fn missing_required_header_names_the_column() {
        let hs = headers(&["Sector"]);
        let err = require_header(&hs, "PNR/Ticket #", "Bookings").unwrap_err();
        assert_eq!(
            err,
            SheetError::ColumnNotFound {
                sheet: "Bookings".into(),
                column: "PNR/Ticket #".into()
            }
        );
    }

    #[test]
    fn sheet_rules_match_substring_or_exact_alias() {
        let bookings = SheetRule::new("booking", "booking").unwrap();
        assert!(bookings.matches("Bookings Nov"));
        assert!(bookings.matches("BOOKING"));

        let master = SheetRule::new("BOOKING", "^booking$").unwrap();
        assert!(master.matches("Booking"));
        assert!(!master.matches("Bookings"));
    }

    #[test]
    fn locate_reports_expected_sheet() {
        let workbook = Workbook {
            source: WorkbookSource::Spreadsheet,
            sheets: vec![RawSheet {
                name: "Summary".into(),
                ..RawSheet::default()
            }],
        };
        let rule = SheetRule::new("refund", "refund").unwrap();
        assert_eq!(
            rule.locate(&workbook).unwrap_err(),
            SheetError::SheetNotFound {
                expected: "refund".into()
            }
        );
    }
}
