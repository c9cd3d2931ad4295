use csv::ReaderBuilder;
use std::io::Cursor;
use tracing::{debug, info, error};
use crate::domain::{
    error::SheetError,
    models::{CellValue, RawRow, RawSheet},
};

/// Parses delimited text into a single sheet keyed by the trimmed header row.
/// Short rows are tolerated; missing trailing cells are simply absent.
pub fn parse_csv(bytes: &[u8], delimiter: u8, sheet_name: &str) -> Result<RawSheet, SheetError> {
    debug!("Creating CSV reader with headers enabled (delimiter {:?})", delimiter as char);
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let cursor = Cursor::new(bytes);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(cursor);

    let headers: Vec<String> = reader.headers()
        .map_err(|e| {
            error!("Failed to read CSV headers: {}", e);
            SheetError::Malformed(e.to_string())
        })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    debug!("CSV headers: {:?}", headers);
    info!("Found {} columns in CSV", headers.len());

    let mut rows = Vec::new();
    let mut row_count = 0;

    for record in reader.records() {
        let record = record.map_err(|e| {
            error!("Failed to read CSV record at row {}: {}", row_count + 1, e);
            SheetError::Malformed(e.to_string())
        })?;

        row_count += 1;
        let mut row = RawRow::new();

        for (i, field) in record.iter().enumerate() {
            if let Some(header) = headers.get(i) {
                if header.is_empty() {
                    continue;
                }
                let value = if field.trim().is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(field.to_string())
                };
                row.insert(header.clone(), value);
            }
        }

        if !row.is_empty() {
            rows.push(row);
        }

        if row_count % 1000 == 0 {
            debug!("Processed {} CSV rows", row_count);
        }
    }

    info!("Parsed {} rows from CSV", rows.len());
    Ok(RawSheet {
        name: sheet_name.to_string(),
        headers,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_rows_keyed_by_trimmed_headers() {
        let csv = "\u{feff} PNR/Ticket # ,Sector\nA1,DEL-BOM\nB2\n,\n";
        let sheet = parse_csv(csv.as_bytes(), b',', "company").unwrap();

        assert_eq!(sheet.headers, vec!["PNR/Ticket #", "Sector"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].text("Sector"), "DEL-BOM");
        assert_eq!(sheet.rows[1].text("PNR/Ticket #"), "B2");
        assert_eq!(sheet.rows[1].get("Sector"), None);
    }

    #[test]
    fn tab_delimited_text() {
        let tsv = "PNR_NO\tUSER_ID\nP1\tu1\n";
        let sheet = parse_csv(tsv.as_bytes(), b'\t', "master").unwrap();
        assert_eq!(sheet.rows[0].text("USER_ID"), "u1");
    }
}
