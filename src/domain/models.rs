use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier of a client company. Bookings and refunds are isolated per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub client_id: TenantId,
    pub company_name: String,
    #[serde(default)]
    pub emails: Vec<String>,
    pub username: Option<String>,
    pub mobile: Option<String>,
    pub gst_number: Option<String>,
    pub address: Option<String>,
    pub sub_corporate: Option<String>,
    pub sub_entity: Option<String>,
    #[serde(default)]
    pub has_excel: bool,
}

impl Tenant {
    pub fn new(client_id: TenantId, company_name: impl Into<String>) -> Self {
        Self {
            client_id,
            company_name: company_name.into(),
            emails: Vec::new(),
            username: None,
            mobile: None,
            gst_number: None,
            address: None,
            sub_corporate: None,
            sub_entity: None,
            has_excel: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
}

/// An authenticated caller, as issued by the external session provider.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminSession {
    pub admin_id: i64,
    pub role: Role,
}

/// A file as received from the caller. Format detection uses the file name
/// and content type, falling back to magic bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A single raw cell as read from a sheet or a pre-parsed JSON row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    /// Trimmed textual rendering. Whole numbers render without a fraction so
    /// that numeric PNRs keep their natural form.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_text().is_empty()
    }
}

impl From<&serde_json::Value> for CellValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Empty,
            serde_json::Value::Bool(b) => CellValue::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Empty),
            serde_json::Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

/// One data row keyed by trimmed header text. Missing cells are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: HashMap<String, CellValue>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later duplicates of a header do not replace the first value.
    pub fn insert(&mut self, header: impl Into<String>, value: CellValue) {
        self.cells.entry(header.into()).or_insert(value);
    }

    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells.get(header)
    }

    pub fn text(&self, header: &str) -> String {
        self.get(header).map(CellValue::as_text).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.values().all(CellValue::is_blank)
    }
}

/// A sheet converted to header-keyed rows, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawSheet {
    /// Builds a sheet from pre-parsed JSON objects. Headers are the ordered
    /// union of keys across all rows.
    pub fn from_json_rows(name: impl Into<String>, rows: &[serde_json::Map<String, serde_json::Value>]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        let mut raw_rows = Vec::with_capacity(rows.len());

        for object in rows {
            let mut row = RawRow::new();
            for (key, value) in object {
                let header = key.trim().to_string();
                if header.is_empty() {
                    continue;
                }
                if !headers.contains(&header) {
                    headers.push(header.clone());
                }
                row.insert(header, CellValue::from(value));
            }
            raw_rows.push(row);
        }

        Self {
            name: name.into(),
            headers,
            rows: raw_rows,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookSource {
    Spreadsheet,
    DelimitedText,
}

/// All sheets of one parsed file.
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub source: WorkbookSource,
    pub sheets: Vec<RawSheet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Booking,
    Refund,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Booking => write!(f, "bookings"),
            RecordKind::Refund => write!(f, "refunds"),
        }
    }
}

/// Which owners an identifier lookup is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerScope {
    Tenant(TenantId),
    OtherThan(TenantId),
}

/// How rows whose identifier already exists for the tenant are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Skip,
    Update,
    /// Delete every booking and refund of the tenant before inserting.
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub serial_no: i64,
    pub date_of_booking: Option<NaiveDate>,
    pub pnr_ticket_no: String,
    pub date_of_travel: Option<NaiveDate>,
    pub passenger_name: Option<String>,
    pub sector: Option<String>,
    pub origin_stn: Option<String>,
    pub destination_stn: Option<String>,
    pub class: Option<String>,
    pub quota: Option<String>,
    pub no_of_pax: i64,
    pub ticket_amount: f64,
    pub s_charges: f64,
    pub gst_18: f64,
    pub total_amount: f64,
    pub booking_id: Option<String>,
    pub vendee_corporate: Option<String>,
    pub sub_corporate: Option<String>,
    pub sub_entity: Option<String>,
    pub ntt_bill_no: Option<String>,
    pub invoice_no: Option<String>,
    /// Month-year label such as `Nov-25`, not a calendar date.
    pub statement_period: Option<String>,
    pub gst_no: Option<String>,
    pub gst_state: Option<String>,
    pub cgst_9: f64,
    pub sgst_9: f64,
    pub igst_18: f64,
    pub utgst: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub serial_no: i64,
    pub refund_date: Option<NaiveDate>,
    pub pnr_no: String,
    pub refund_amount: f64,
    pub vendee_corporate: Option<String>,
    pub sub_corporate: Option<String>,
    pub sub_entity: Option<String>,
}

/// Borrowed batch of one record type, handed to a storage transaction.
#[derive(Debug, Clone, Copy)]
pub enum RecordBatch<'a> {
    Bookings(&'a [BookingRecord]),
    Refunds(&'a [RefundRecord]),
}

impl RecordBatch<'_> {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordBatch::Bookings(_) => RecordKind::Booking,
            RecordBatch::Refunds(_) => RecordKind::Refund,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordBatch::Bookings(rows) => rows.len(),
            RecordBatch::Refunds(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl KindCounts {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCounts {
    pub bookings: KindCounts,
    pub refunds: KindCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadPreview {
    pub bookings: Vec<BookingRecord>,
    pub refunds: Vec<RefundRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadOutcome {
    pub success: bool,
    pub bookings: KindCounts,
    pub refunds: KindCounts,
    pub preview: UploadPreview,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TenantRecordCounts {
    pub bookings: u64,
    pub refunds: u64,
}

impl TenantRecordCounts {
    pub fn exists(&self) -> bool {
        self.bookings + self.refunds > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadType {
    ClientExcelUpload,
    ClientExcelDelete,
}

impl UploadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadType::ClientExcelUpload => "CLIENT_EXCEL_UPLOAD",
            UploadType::ClientExcelDelete => "CLIENT_EXCEL_DELETE",
        }
    }
}

/// First write of an audit entry, made before the attempt starts.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub admin_id: i64,
    pub client_id: TenantId,
    pub upload_type: UploadType,
    pub file_name: Option<String>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub log_id: String,
    pub admin_id: i64,
    pub client_id: TenantId,
    pub upload_type: UploadType,
    pub file_name: Option<String>,
    pub rows_inserted: i64,
    pub rows_updated: i64,
    pub rows_skipped: i64,
    pub notes: String,
}
