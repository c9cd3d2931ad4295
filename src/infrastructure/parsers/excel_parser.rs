use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Range, Reader, Sheets, Xls, Xlsb, Xlsx};
use tracing::{debug, error, info, warn};

use crate::domain::{
    error::SheetError,
    models::{CellValue, RawRow, RawSheet},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    /// Zip-based OOXML (`.xlsx`, `.xlsm`).
    Xlsx,
    /// Legacy BIFF (`.xls`).
    Xls,
    Xlsb,
}

/// Reads every worksheet of a spreadsheet held in memory.
pub fn parse_spreadsheet(bytes: &[u8], format: SpreadsheetFormat) -> Result<Vec<RawSheet>, SheetError> {
    debug!("Opening {:?} workbook ({} bytes)", format, bytes.len());
    let cursor = Cursor::new(bytes);

    let mut workbook: Sheets<Cursor<&[u8]>> = match format {
        SpreadsheetFormat::Xlsx => open_workbook_from_rs::<Xlsx<_>, _>(cursor)
            .map(Sheets::Xlsx)
            .map_err(|e| malformed(e.to_string()))?,
        SpreadsheetFormat::Xls => open_workbook_from_rs::<Xls<_>, _>(cursor)
            .map(Sheets::Xls)
            .map_err(|e| malformed(e.to_string()))?,
        SpreadsheetFormat::Xlsb => open_workbook_from_rs::<Xlsb<_>, _>(cursor)
            .map(Sheets::Xlsb)
            .map_err(|e| malformed(e.to_string()))?,
    };

    let sheet_names = workbook.sheet_names().to_vec();
    debug!("Workbook sheets: {:?}", sheet_names);

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        match workbook.worksheet_range(&name) {
            Ok(range) => sheets.push(range_to_sheet(&name, &range)),
            Err(e) => {
                // Chart sheets and similar have no cell range.
                warn!("Skipping sheet '{}': {}", name, e);
            }
        }
    }

    info!("Parsed {} sheets from workbook", sheets.len());
    Ok(sheets)
}

fn malformed(message: String) -> SheetError {
    error!("Failed to open workbook: {}", message);
    SheetError::Malformed(message)
}

/// First row is the header row; every later row becomes a [`RawRow`].
/// Sparse rows never fail: absent cells read as empty.
fn range_to_sheet(name: &str, range: &Range<Data>) -> RawSheet {
    let mut rows_iter = range.rows();
    let Some(header_row) = rows_iter.next() else {
        return RawSheet {
            name: name.to_string(),
            ..RawSheet::default()
        };
    };

    let headers: Vec<String> = header_row.iter().map(|cell| to_cell_value(cell).as_text()).collect();

    let mut rows = Vec::new();
    for data_row in rows_iter {
        let mut row = RawRow::new();
        for (header, cell) in headers.iter().zip(data_row.iter()) {
            if header.is_empty() {
                continue;
            }
            row.insert(header.clone(), to_cell_value(cell));
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }

    debug!("Sheet '{}': {} headers, {} data rows", name, headers.len(), rows.len());
    RawSheet {
        name: name.to_string(),
        headers: headers.into_iter().filter(|h| !h.is_empty()).collect(),
        rows,
    }
}

/// Date cells keep their day serial so the normalizer applies one epoch rule
/// to every encoding.
pub fn to_cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}
