//! Header-keyed rows → typed records.
//!
//! Each record type declares a table of `header → (field, class)`; one generic
//! routine resolves the headers against the sheet, drops rows whose
//! identifying column is blank and converts every mapped cell by its class.

use tracing::debug;

use crate::domain::dates::{cell_to_date, cell_to_period, DateContext};
use crate::domain::error::SheetError;
use crate::domain::headers::{require_header, resolve_header};
use crate::domain::models::{BookingRecord, CellValue, RawRow, RawSheet, RecordBatch, RecordKind, RefundRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    Date,
    StatementPeriod,
    Integer,
    Amount,
    Text,
}

pub struct FieldMapping<F> {
    pub header: &'static str,
    pub field: F,
    pub class: FieldClass,
}

const fn map<F>(header: &'static str, field: F, class: FieldClass) -> FieldMapping<F> {
    FieldMapping { header, field, class }
}

/// A converted cell, tagged by the class that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Date(Option<chrono::NaiveDate>),
    Text(Option<String>),
    Integer(i64),
    Amount(f64),
}

impl FieldValue {
    fn date(self) -> Option<chrono::NaiveDate> {
        match self {
            FieldValue::Date(d) => d,
            _ => None,
        }
    }

    fn text(self) -> Option<String> {
        match self {
            FieldValue::Text(t) => t,
            _ => None,
        }
    }

    fn integer(self) -> i64 {
        match self {
            FieldValue::Integer(i) => i,
            _ => 0,
        }
    }

    fn amount(self) -> f64 {
        match self {
            FieldValue::Amount(a) => a,
            _ => 0.0,
        }
    }
}

/// A record type that can be produced from a raw sheet.
pub trait NormalizedRecord: Default + Clone + Send + Sync + 'static {
    type Field: Copy + 'static;

    const KIND: RecordKind;
    /// Column whose blank value excludes a row entirely.
    const IDENTIFIER_HEADER: &'static str;

    fn mapping() -> &'static [FieldMapping<Self::Field>];
    fn assign(&mut self, field: Self::Field, value: FieldValue);
    fn set_identifier(&mut self, identifier: String);
    fn identifier(&self) -> &str;
    fn batch(rows: &[Self]) -> RecordBatch<'_>;
}

pub fn convert(cell: &CellValue, class: FieldClass, ctx: &DateContext) -> FieldValue {
    match class {
        FieldClass::Date => FieldValue::Date(cell_to_date(cell, ctx)),
        FieldClass::StatementPeriod => FieldValue::Text(cell_to_period(cell)),
        FieldClass::Integer => FieldValue::Integer(to_number(cell).trunc() as i64),
        FieldClass::Amount => FieldValue::Amount(to_number(cell)),
        FieldClass::Text => {
            let text = cell.as_text();
            FieldValue::Text((!text.is_empty()).then_some(text))
        }
    }
}

/// Blank, non-numeric and non-finite values all become 0.
fn to_number(cell: &CellValue) -> f64 {
    let parsed = match cell {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => {
            let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
            cleaned.parse::<f64>().unwrap_or(0.0)
        }
        CellValue::Empty | CellValue::Bool(_) => 0.0,
    };
    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRows<R> {
    pub records: Vec<R>,
    /// Rows excluded because the identifying column was blank.
    pub blank_identifier_rows: usize,
}

pub fn normalize_sheet<R: NormalizedRecord>(
    sheet: &RawSheet,
    ctx: &DateContext,
) -> Result<NormalizedRows<R>, SheetError> {
    let identifier_header = require_header(&sheet.headers, R::IDENTIFIER_HEADER, &sheet.name)?;

    let mut resolved = Vec::new();
    for mapping in R::mapping() {
        if let Some(header) = resolve_header(&sheet.headers, mapping.header, &sheet.name)? {
            resolved.push((header, mapping));
        }
    }
    debug!(
        "Resolved {}/{} {} columns in sheet '{}'",
        resolved.len(),
        R::mapping().len(),
        R::KIND,
        sheet.name
    );

    let mut records = Vec::with_capacity(sheet.rows.len());
    let mut blank_identifier_rows = 0;

    for row in &sheet.rows {
        let identifier = row.text(identifier_header);
        if identifier.is_empty() {
            blank_identifier_rows += 1;
            continue;
        }
        records.push(normalize_row::<R>(row, identifier, &resolved, ctx));
    }

    Ok(NormalizedRows {
        records,
        blank_identifier_rows,
    })
}

fn normalize_row<R: NormalizedRecord>(
    row: &RawRow,
    identifier: String,
    resolved: &[(&str, &FieldMapping<R::Field>)],
    ctx: &DateContext,
) -> R {
    let mut record = R::default();
    record.set_identifier(identifier);
    for (header, mapping) in resolved {
        let cell = row.get(header).unwrap_or(&CellValue::Empty);
        record.assign(mapping.field, convert(cell, mapping.class, ctx));
    }
    record
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingField {
    SerialNo,
    DateOfBooking,
    DateOfTravel,
    PassengerName,
    Sector,
    OriginStn,
    DestinationStn,
    Class,
    Quota,
    NoOfPax,
    TicketAmount,
    SCharges,
    Gst18,
    TotalAmount,
    BookingId,
    VendeeCorporate,
    SubCorporate,
    SubEntity,
    NttBillNo,
    InvoiceNo,
    StatementPeriod,
    GstNo,
    GstState,
    Cgst9,
    Sgst9,
    Igst18,
    Utgst,
}

static BOOKING_FIELDS: [FieldMapping<BookingField>; 27] = [
    map("S. No.", BookingField::SerialNo, FieldClass::Integer),
    map("Date of Booking", BookingField::DateOfBooking, FieldClass::Date),
    map("Date of Travel", BookingField::DateOfTravel, FieldClass::Date),
    map("Passenger Name", BookingField::PassengerName, FieldClass::Text),
    map("Sector", BookingField::Sector, FieldClass::Text),
    map("Origin Stn.", BookingField::OriginStn, FieldClass::Text),
    map("Destination Stn.", BookingField::DestinationStn, FieldClass::Text),
    map("Class", BookingField::Class, FieldClass::Text),
    map("Quota", BookingField::Quota, FieldClass::Text),
    map("No. of Pax", BookingField::NoOfPax, FieldClass::Integer),
    map("Ticket Amount", BookingField::TicketAmount, FieldClass::Amount),
    map("S. Charges", BookingField::SCharges, FieldClass::Amount),
    map("GST (18%)", BookingField::Gst18, FieldClass::Amount),
    map("Total Amount", BookingField::TotalAmount, FieldClass::Amount),
    map("Booking ID", BookingField::BookingId, FieldClass::Text),
    map("Vendee/Corporate", BookingField::VendeeCorporate, FieldClass::Text),
    map("Sub-Corporate", BookingField::SubCorporate, FieldClass::Text),
    map("Sub-Entity", BookingField::SubEntity, FieldClass::Text),
    map("NTT Bill No.", BookingField::NttBillNo, FieldClass::Text),
    map("Invoice No.", BookingField::InvoiceNo, FieldClass::Text),
    map("Statement Period", BookingField::StatementPeriod, FieldClass::StatementPeriod),
    map("GST No.", BookingField::GstNo, FieldClass::Text),
    map("GST State", BookingField::GstState, FieldClass::Text),
    map("CGST %9", BookingField::Cgst9, FieldClass::Amount),
    map("SGST % 9", BookingField::Sgst9, FieldClass::Amount),
    map("IGST % 18", BookingField::Igst18, FieldClass::Amount),
    map("UTGST", BookingField::Utgst, FieldClass::Amount),
];

impl NormalizedRecord for BookingRecord {
    type Field = BookingField;

    const KIND: RecordKind = RecordKind::Booking;
    const IDENTIFIER_HEADER: &'static str = "PNR/Ticket #";

    fn mapping() -> &'static [FieldMapping<BookingField>] {
        &BOOKING_FIELDS
    }

    fn assign(&mut self, field: BookingField, value: FieldValue) {
        match field {
            BookingField::SerialNo => self.serial_no = value.integer(),
            BookingField::DateOfBooking => self.date_of_booking = value.date(),
            BookingField::DateOfTravel => self.date_of_travel = value.date(),
            BookingField::PassengerName => self.passenger_name = value.text(),
            BookingField::Sector => self.sector = value.text(),
            BookingField::OriginStn => self.origin_stn = value.text(),
            BookingField::DestinationStn => self.destination_stn = value.text(),
            BookingField::Class => self.class = value.text(),
            BookingField::Quota => self.quota = value.text(),
            BookingField::NoOfPax => self.no_of_pax = value.integer(),
            BookingField::TicketAmount => self.ticket_amount = value.amount(),
            BookingField::SCharges => self.s_charges = value.amount(),
            BookingField::Gst18 => self.gst_18 = value.amount(),
            BookingField::TotalAmount => self.total_amount = value.amount(),
            BookingField::BookingId => self.booking_id = value.text(),
            BookingField::VendeeCorporate => self.vendee_corporate = value.text(),
            BookingField::SubCorporate => self.sub_corporate = value.text(),
            BookingField::SubEntity => self.sub_entity = value.text(),
            BookingField::NttBillNo => self.ntt_bill_no = value.text(),
            BookingField::InvoiceNo => self.invoice_no = value.text(),
            BookingField::StatementPeriod => self.statement_period = value.text(),
            BookingField::GstNo => self.gst_no = value.text(),
            BookingField::GstState => self.gst_state = value.text(),
            BookingField::Cgst9 => self.cgst_9 = value.amount(),
            BookingField::Sgst9 => self.sgst_9 = value.amount(),
            BookingField::Igst18 => self.igst_18 = value.amount(),
            BookingField::Utgst => self.utgst = value.amount(),
        }
    }

    fn set_identifier(&mut self, identifier: String) {
        self.pnr_ticket_no = identifier;
    }

    fn identifier(&self) -> &str {
        &self.pnr_ticket_no
    }

    fn batch(rows: &[Self]) -> RecordBatch<'_> {
        RecordBatch::Bookings(rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundField {
    SerialNo,
    RefundDate,
    RefundAmount,
    VendeeCorporate,
    SubCorporate,
    SubEntity,
}

static REFUND_FIELDS: [FieldMapping<RefundField>; 6] = [
    map("S.No.", RefundField::SerialNo, FieldClass::Integer),
    map("REFUND DATE", RefundField::RefundDate, FieldClass::Date),
    map("REFUND", RefundField::RefundAmount, FieldClass::Amount),
    map("Vendee/Corporate", RefundField::VendeeCorporate, FieldClass::Text),
    map("Sub-Corporate", RefundField::SubCorporate, FieldClass::Text),
    map("Sub-Entity", RefundField::SubEntity, FieldClass::Text),
];

impl NormalizedRecord for RefundRecord {
    type Field = RefundField;

    const KIND: RecordKind = RecordKind::Refund;
    const IDENTIFIER_HEADER: &'static str = "PNR_NO";

    fn mapping() -> &'static [FieldMapping<RefundField>] {
        &REFUND_FIELDS
    }

    fn assign(&mut self, field: RefundField, value: FieldValue) {
        match field {
            RefundField::SerialNo => self.serial_no = value.integer(),
            RefundField::RefundDate => self.refund_date = value.date(),
            RefundField::RefundAmount => self.refund_amount = value.amount(),
            RefundField::VendeeCorporate => self.vendee_corporate = value.text(),
            RefundField::SubCorporate => self.sub_corporate = value.text(),
            RefundField::SubEntity => self.sub_entity = value.text(),
        }
    }

    fn set_identifier(&mut self, identifier: String) {
        self.pnr_no = identifier;
    }

    fn identifier(&self) -> &str {
        &self.pnr_no
    }

    fn batch(rows: &[Self]) -> RecordBatch<'_> {
        RecordBatch::Refunds(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn sheet(name: &str, headers: &[&str], rows: Vec<Vec<CellValue>>) -> RawSheet {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        let rows = rows
            .into_iter()
            .map(|cells| {
                let mut row = RawRow::new();
                for (header, cell) in headers.iter().zip(cells) {
                    row.insert(header.clone(), cell);
                }
                row
            })
            .collect();
        RawSheet {
            name: name.to_string(),
            headers,
            rows,
        }
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn booking_row_converts_by_field_class() {
        let sheet = sheet(
            "Bookings",
            &["S. No.", "Date of Booking", "PNR/Ticket #", "Ticket Amount", "Statement Period", "Unrelated"],
            vec![vec![
                CellValue::Number(1.0),
                CellValue::Number(44562.0),
                CellValue::Number(4512345678.0),
                text("1,250.50"),
                CellValue::Number(45962.0),
                text("ignored"),
            ]],
        );

        let rows = normalize_sheet::<BookingRecord>(&sheet, &DateContext::default()).unwrap();
        let booking = &rows.records[0];

        assert_eq!(booking.serial_no, 1);
        assert_eq!(booking.pnr_ticket_no, "4512345678");
        assert_eq!(booking.date_of_booking, NaiveDate::from_ymd_opt(2022, 1, 1));
        assert_eq!(booking.ticket_amount, 1250.5);
        assert_eq!(booking.statement_period.as_deref(), Some("Nov-25"));
        assert_eq!(booking.passenger_name, None);
    }

    #[test]
    fn blank_identifier_rows_are_dropped_before_conversion() {
        let sheet = sheet(
            "Refunds",
            &["PNR_NO", "REFUND"],
            vec![
                vec![text("R1"), CellValue::Number(10.0)],
                vec![text("   "), CellValue::Number(99.0)],
                vec![CellValue::Empty, CellValue::Number(5.0)],
            ],
        );

        let rows = normalize_sheet::<RefundRecord>(&sheet, &DateContext::default()).unwrap();
        assert_eq!(rows.records.len(), 1);
        assert_eq!(rows.blank_identifier_rows, 2);
        assert_eq!(rows.records[0].refund_amount, 10.0);
    }

    #[test]
    fn numeric_garbage_becomes_zero() {
        let sheet = sheet(
            "Refunds",
            &["PNR_NO", "REFUND", "S.No."],
            vec![vec![text("R1"), text("n/a"), CellValue::Empty]],
        );
        let rows = normalize_sheet::<RefundRecord>(&sheet, &DateContext::default()).unwrap();
        assert_eq!(rows.records[0].refund_amount, 0.0);
        assert_eq!(rows.records[0].serial_no, 0);
    }

    #[test]
    fn missing_identifier_column_fails() {
        let sheet = sheet("Bookings", &["Sector"], vec![]);
        let err = normalize_sheet::<BookingRecord>(&sheet, &DateContext::default()).unwrap_err();
        assert!(matches!(err, SheetError::ColumnNotFound { .. }));
    }

    #[test]
    fn header_variants_still_map() {
        let sheet = sheet(
            "refund",
            &["pnr no", "Refund Date", "refund"],
            vec![vec![text("R9"), text("2025-03-15"), text("12")]],
        );
        let rows = normalize_sheet::<RefundRecord>(&sheet, &DateContext::default()).unwrap();
        let refund = &rows.records[0];
        assert_eq!(refund.pnr_no, "R9");
        assert_eq!(refund.refund_date, NaiveDate::from_ymd_opt(2025, 3, 15));
        assert_eq!(refund.refund_amount, 12.0);
    }
}
