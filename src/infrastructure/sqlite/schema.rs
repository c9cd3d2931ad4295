//! Table and column identifiers for the relational backend.

use sea_query::Iden;

#[derive(Iden, Clone, Copy)]
pub enum Clients {
    Table,
    #[iden = "client_id"]
    ClientId,
    #[iden = "company_name"]
    CompanyName,
    #[iden = "emails"]
    Emails,
    #[iden = "username"]
    Username,
    #[iden = "mobile"]
    Mobile,
    #[iden = "gst_number"]
    GstNumber,
    #[iden = "address"]
    Address,
    #[iden = "sub_corporate"]
    SubCorporate,
    #[iden = "sub_entity"]
    SubEntity,
    #[iden = "has_excel"]
    HasExcel,
}

#[derive(Iden, Clone, Copy)]
pub enum Bookings {
    Table,
    #[iden = "client_id"]
    ClientId,
    #[iden = "serial_no"]
    SerialNo,
    #[iden = "date_of_booking"]
    DateOfBooking,
    #[iden = "pnr_ticket_no"]
    PnrTicketNo,
    #[iden = "date_of_travel"]
    DateOfTravel,
    #[iden = "passenger_name"]
    PassengerName,
    #[iden = "sector"]
    Sector,
    #[iden = "origin_stn"]
    OriginStn,
    #[iden = "destination_stn"]
    DestinationStn,
    #[iden = "class"]
    Class,
    #[iden = "quota"]
    Quota,
    #[iden = "no_of_pax"]
    NoOfPax,
    #[iden = "ticket_amount"]
    TicketAmount,
    #[iden = "s_charges"]
    SCharges,
    #[iden = "gst_18"]
    Gst18,
    #[iden = "total_amount"]
    TotalAmount,
    #[iden = "booking_id"]
    BookingId,
    #[iden = "vendee_corporate"]
    VendeeCorporate,
    #[iden = "sub_corporate"]
    SubCorporate,
    #[iden = "sub_entity"]
    SubEntity,
    #[iden = "ntt_bill_no"]
    NttBillNo,
    #[iden = "invoice_no"]
    InvoiceNo,
    #[iden = "statement_period"]
    StatementPeriod,
    #[iden = "gst_no"]
    GstNo,
    #[iden = "gst_state"]
    GstState,
    #[iden = "cgst_9"]
    Cgst9,
    #[iden = "sgst_9"]
    Sgst9,
    #[iden = "igst_18"]
    Igst18,
    #[iden = "utgst"]
    Utgst,
}

#[derive(Iden, Clone, Copy)]
pub enum Refunds {
    Table,
    #[iden = "client_id"]
    ClientId,
    #[iden = "serial_no"]
    SerialNo,
    #[iden = "refund_date"]
    RefundDate,
    #[iden = "pnr_no"]
    PnrNo,
    #[iden = "refund_amount"]
    RefundAmount,
    #[iden = "vendee_corporate"]
    VendeeCorporate,
    #[iden = "sub_corporate"]
    SubCorporate,
    #[iden = "sub_entity"]
    SubEntity,
}

#[derive(Iden, Clone, Copy)]
pub enum UploadLogs {
    Table,
    #[iden = "log_id"]
    LogId,
    #[iden = "admin_id"]
    AdminId,
    #[iden = "client_id"]
    ClientId,
    #[iden = "upload_type"]
    UploadType,
    #[iden = "file_name"]
    FileName,
    #[iden = "rows_inserted"]
    RowsInserted,
    #[iden = "rows_updated"]
    RowsUpdated,
    #[iden = "rows_skipped"]
    RowsSkipped,
    #[iden = "notes"]
    Notes,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

pub const CREATE_CLIENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS clients (
    client_id INTEGER PRIMARY KEY,
    company_name TEXT NOT NULL,
    emails TEXT NOT NULL DEFAULT '[]',
    username TEXT,
    mobile TEXT,
    gst_number TEXT,
    address TEXT,
    sub_corporate TEXT,
    sub_entity TEXT,
    has_excel INTEGER NOT NULL DEFAULT 0
);
"#;

pub const CREATE_BOOKINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS bookings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id INTEGER NOT NULL REFERENCES clients(client_id),
    serial_no INTEGER NOT NULL DEFAULT 0,
    date_of_booking TEXT,
    pnr_ticket_no TEXT NOT NULL,
    date_of_travel TEXT,
    passenger_name TEXT,
    sector TEXT,
    origin_stn TEXT,
    destination_stn TEXT,
    class TEXT,
    quota TEXT,
    no_of_pax INTEGER NOT NULL DEFAULT 0,
    ticket_amount REAL NOT NULL DEFAULT 0,
    s_charges REAL NOT NULL DEFAULT 0,
    gst_18 REAL NOT NULL DEFAULT 0,
    total_amount REAL NOT NULL DEFAULT 0,
    booking_id TEXT,
    vendee_corporate TEXT,
    sub_corporate TEXT,
    sub_entity TEXT,
    ntt_bill_no TEXT,
    invoice_no TEXT,
    statement_period TEXT,
    gst_no TEXT,
    gst_state TEXT,
    cgst_9 REAL NOT NULL DEFAULT 0,
    sgst_9 REAL NOT NULL DEFAULT 0,
    igst_18 REAL NOT NULL DEFAULT 0,
    utgst REAL NOT NULL DEFAULT 0,
    UNIQUE (client_id, pnr_ticket_no)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_client_booking_id
    ON bookings(client_id, booking_id) WHERE booking_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_bookings_pnr ON bookings(pnr_ticket_no);
"#;

pub const CREATE_REFUNDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS refunds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id INTEGER NOT NULL REFERENCES clients(client_id),
    serial_no INTEGER NOT NULL DEFAULT 0,
    refund_date TEXT,
    pnr_no TEXT NOT NULL,
    refund_amount REAL NOT NULL DEFAULT 0,
    vendee_corporate TEXT,
    sub_corporate TEXT,
    sub_entity TEXT,
    UNIQUE (client_id, pnr_no)
);

CREATE INDEX IF NOT EXISTS idx_refunds_pnr ON refunds(pnr_no);
"#;

pub const CREATE_UPLOAD_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS upload_logs (
    log_id TEXT PRIMARY KEY,
    admin_id INTEGER NOT NULL,
    client_id INTEGER NOT NULL,
    upload_type TEXT NOT NULL,
    file_name TEXT,
    rows_inserted INTEGER NOT NULL DEFAULT 0,
    rows_updated INTEGER NOT NULL DEFAULT 0,
    rows_skipped INTEGER NOT NULL DEFAULT 0,
    notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
