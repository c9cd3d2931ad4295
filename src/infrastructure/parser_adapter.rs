use tracing::{debug, info, warn};

use crate::domain::{
    error::SheetError,
    models::{UploadedFile, Workbook, WorkbookSource},
    ports::WorkbookParser,
};
use crate::infrastructure::parsers::{
    csv_parser::parse_csv,
    detect_format,
    excel_parser::parse_spreadsheet,
    FileFormat,
};

/// Size-capped file parser backed by calamine and csv.
pub struct ParserAdapter {
    max_file_bytes: usize,
}

impl ParserAdapter {
    pub fn new(max_file_bytes: usize) -> Self {
        debug!("Initializing parser adapter (max {} bytes per file)", max_file_bytes);
        Self { max_file_bytes }
    }
}

impl WorkbookParser for ParserAdapter {
    fn parse(&self, file: &UploadedFile) -> Result<Workbook, SheetError> {
        let size = file.bytes.len();
        if size > self.max_file_bytes {
            warn!("Rejecting '{}': {} bytes exceeds {}", file.file_name, size, self.max_file_bytes);
            return Err(SheetError::FileTooLarge {
                size,
                limit: self.max_file_bytes,
            });
        }

        let format = detect_format(&file.file_name, file.content_type.as_deref(), &file.bytes)
            .ok_or_else(|| SheetError::UnsupportedFormat(file.file_name.clone()))?;
        debug!("Detected format {:?} for '{}'", format, file.file_name);

        let workbook = match format {
            FileFormat::Spreadsheet(kind) => Workbook {
                source: WorkbookSource::Spreadsheet,
                sheets: parse_spreadsheet(&file.bytes, kind)?,
            },
            FileFormat::Delimited(delimiter) => {
                let stem = file
                    .file_name
                    .rsplit_once('.')
                    .map(|(stem, _)| stem)
                    .unwrap_or(&file.file_name);
                Workbook {
                    source: WorkbookSource::DelimitedText,
                    sheets: vec![parse_csv(&file.bytes, delimiter, stem)?],
                }
            }
        };

        info!("Parsed '{}' into {} sheet(s)", file.file_name, workbook.sheets.len());
        Ok(workbook)
    }
}
