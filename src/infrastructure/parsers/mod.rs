pub mod csv_parser;
pub mod excel_parser;

use excel_parser::SpreadsheetFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Spreadsheet(SpreadsheetFormat),
    Delimited(u8),
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Picks a format from the file extension, then the content type, then the
/// leading bytes.
pub fn detect_format(file_name: &str, content_type: Option<&str>, bytes: &[u8]) -> Option<FileFormat> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let by_extension = match extension.as_str() {
        "xlsx" | "xlsm" => Some(FileFormat::Spreadsheet(SpreadsheetFormat::Xlsx)),
        "xls" => Some(FileFormat::Spreadsheet(SpreadsheetFormat::Xls)),
        "xlsb" => Some(FileFormat::Spreadsheet(SpreadsheetFormat::Xlsb)),
        "csv" | "txt" => Some(FileFormat::Delimited(b',')),
        "tsv" => Some(FileFormat::Delimited(b'\t')),
        _ => None,
    };
    if by_extension.is_some() {
        return by_extension;
    }

    let mime = content_type
        .map(|c| c.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .unwrap_or_default();
    let by_mime = match mime.as_str() {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
            Some(FileFormat::Spreadsheet(SpreadsheetFormat::Xlsx))
        }
        "application/vnd.ms-excel" => Some(FileFormat::Spreadsheet(SpreadsheetFormat::Xls)),
        "text/csv" | "text/plain" => Some(FileFormat::Delimited(b',')),
        "text/tab-separated-values" => Some(FileFormat::Delimited(b'\t')),
        _ => None,
    };
    if by_mime.is_some() {
        return by_mime;
    }

    if bytes.starts_with(ZIP_MAGIC) {
        Some(FileFormat::Spreadsheet(SpreadsheetFormat::Xlsx))
    } else if bytes.starts_with(CFB_MAGIC) {
        Some(FileFormat::Spreadsheet(SpreadsheetFormat::Xls))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_beats_content_type() {
        assert_eq!(
            detect_format("Master.XLSX", Some("text/csv"), b""),
            Some(FileFormat::Spreadsheet(SpreadsheetFormat::Xlsx))
        );
        assert_eq!(detect_format("company.csv", None, b""), Some(FileFormat::Delimited(b',')));
    }

    #[test]
    fn falls_back_to_content_type_then_magic() {
        assert_eq!(
            detect_format("upload", Some("application/vnd.ms-excel"), b""),
            Some(FileFormat::Spreadsheet(SpreadsheetFormat::Xls))
        );
        assert_eq!(
            detect_format("blob", None, b"PK\x03\x04rest"),
            Some(FileFormat::Spreadsheet(SpreadsheetFormat::Xlsx))
        );
        assert_eq!(detect_format("notes.docx", None, b"hello"), None);
    }
}
