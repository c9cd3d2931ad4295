#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use booking_ingestion::application::{
    batch_upsert::BatchUpsertEngine,
    conflict_checker::ConflictChecker,
    ingestion_service::{IngestionService, IngestionSettings, UploadPayload, UploadRequest},
};
use booking_ingestion::domain::{
    dates::DateContext,
    headers::SheetRule,
    models::{AdminSession, Role, Tenant, TenantId, UploadedFile, WriteMode},
    ports::TenantRepository,
};
use booking_ingestion::infrastructure::{
    parser_adapter::ParserAdapter,
    sqlite::{self, SqliteDataRepository, SqliteLogRepository, SqliteTenantRepository},
};
use rust_xlsxwriter::Workbook;
use sqlx::SqlitePool;

pub const ACME: TenantId = TenantId(1);
pub const GLOBEX: TenantId = TenantId(2);

pub const BOOKING_HEADERS: [&str; 5] = ["S. No.", "Date of Booking", "PNR/Ticket #", "Passenger Name", "Total Amount"];
pub const REFUND_HEADERS: [&str; 3] = ["PNR_NO", "REFUND DATE", "REFUND"];

/// One spreadsheet cell of a fixture.
#[derive(Debug, Clone)]
pub enum Cell {
    Text(String),
    Number(f64),
    Blank,
}

impl Cell {
    pub fn text(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

pub struct TestApp {
    pub pool: SqlitePool,
    pub service: Arc<IngestionService>,
}

pub fn admin() -> AdminSession {
    AdminSession {
        admin_id: 99,
        role: Role::Admin,
    }
}

pub fn settings() -> IngestionSettings {
    IngestionSettings {
        bookings_sheet: SheetRule::new("bookings", "booking").unwrap(),
        refunds_sheet: SheetRule::new("refunds", "refund").unwrap(),
        preview_rows: 10,
        dates: DateContext::default(),
    }
}

/// In-memory SQLite store with two tenants and a service over it.
pub async fn test_app(chunk_size: usize) -> TestApp {
    test_app_with_file_limit(chunk_size, 10 * 1024 * 1024).await
}

pub async fn test_app_with_file_limit(chunk_size: usize, max_file_bytes: usize) -> TestApp {
    let pool = sqlite::connect("sqlite::memory:").await.expect("failed to open in-memory pool");
    sqlite::init_schema(&pool).await.expect("failed to init schema");

    let tenants = Arc::new(SqliteTenantRepository::new(pool.clone()));
    tenants.save_tenant(&Tenant::new(ACME, "Acme Travels")).await.unwrap();
    tenants.save_tenant(&Tenant::new(GLOBEX, "Globex Corp")).await.unwrap();

    let service = IngestionService::new(
        Arc::new(ParserAdapter::new(max_file_bytes)),
        tenants,
        Arc::new(SqliteDataRepository::new(pool.clone())),
        Arc::new(SqliteLogRepository::new(pool.clone())),
        BatchUpsertEngine::new(ConflictChecker::new(chunk_size), Duration::from_secs(30)),
        settings(),
    );

    TestApp {
        pool,
        service: Arc::new(service),
    }
}

/// An xlsx workbook with one sheet per `(name, headers, rows)` entry.
pub fn xlsx(sheets: &[(&str, &[&str], Vec<Vec<Cell>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, headers, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).unwrap();
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        for (r, row) in rows.iter().enumerate() {
            let line = r as u32 + 1;
            for (col, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Text(text) => {
                        sheet.write_string(line, col as u16, text.as_str()).unwrap();
                    }
                    Cell::Number(n) => {
                        sheet.write_number(line, col as u16, *n).unwrap();
                    }
                    Cell::Blank => {}
                }
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

/// Booking rows `(pnr, passenger)` with a fixed booking date serial.
pub fn booking_rows(rows: &[(&str, &str)]) -> Vec<Vec<Cell>> {
    rows.iter()
        .enumerate()
        .map(|(i, (pnr, name))| {
            vec![
                Cell::Number(i as f64 + 1.0),
                Cell::Number(44562.0),
                Cell::text(pnr),
                Cell::text(name),
                Cell::Number(1000.0),
            ]
        })
        .collect()
}

pub fn refund_rows(pnrs: &[&str]) -> Vec<Vec<Cell>> {
    pnrs.iter()
        .map(|pnr| vec![Cell::text(pnr), Cell::text("2025-03-15"), Cell::Number(250.0)])
        .collect()
}

pub fn bookings_file(rows: &[(&str, &str)]) -> UploadedFile {
    UploadedFile::new(
        "statement.xlsx",
        xlsx(&[("Bookings", &BOOKING_HEADERS[..], booking_rows(rows))]),
    )
}

pub fn upload(tenant: TenantId, mode: WriteMode, file: UploadedFile) -> UploadRequest {
    UploadRequest {
        session: admin(),
        tenant,
        mode,
        payload: UploadPayload::File(file),
    }
}

pub async fn stored_bookings(pool: &SqlitePool, tenant: TenantId) -> Vec<String> {
    sqlx::query_scalar("SELECT pnr_ticket_no FROM bookings WHERE client_id = ? ORDER BY pnr_ticket_no")
        .bind(tenant.0)
        .fetch_all(pool)
        .await
        .unwrap()
}

pub async fn stored_refunds(pool: &SqlitePool, tenant: TenantId) -> Vec<String> {
    sqlx::query_scalar("SELECT pnr_no FROM refunds WHERE client_id = ? ORDER BY pnr_no")
        .bind(tenant.0)
        .fetch_all(pool)
        .await
        .unwrap()
}

pub async fn has_excel(pool: &SqlitePool, tenant: TenantId) -> bool {
    sqlx::query_scalar("SELECT has_excel FROM clients WHERE client_id = ?")
        .bind(tenant.0)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// `(upload_type, rows_inserted, notes)` of every audit entry of a tenant, oldest first.
pub async fn audit_entries(pool: &SqlitePool, tenant: TenantId) -> Vec<(String, i64, String)> {
    sqlx::query_as("SELECT upload_type, rows_inserted, notes FROM upload_logs WHERE client_id = ? ORDER BY created_at, rowid")
        .bind(tenant.0)
        .fetch_all(pool)
        .await
        .unwrap()
}
