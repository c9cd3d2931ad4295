use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, Query, SimpleExpr, SqliteQueryBuilder};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::map_sqlx_error;
use super::schema::UploadLogs;
use crate::domain::{
    error::IngestionError,
    models::{AuditEntry, NewAuditEntry, TenantId, UploadCounts, UploadType},
    ports::AuditLog,
};

pub struct SqliteLogRepository {
    pool: SqlitePool,
}

impl SqliteLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        debug!("Initializing SQLite log repository");
        Self { pool }
    }

    async fn execute(&self, sql: &str, log_id: &str) -> Result<(), IngestionError> {
        let result = sqlx::query(sql).execute(&self.pool).await.map_err(|e| {
            error!("Failed to update audit entry {}: {}", log_id, e);
            map_sqlx_error(e)
        })?;
        if result.rows_affected() == 0 {
            return Err(IngestionError::Unexpected(format!("audit entry {log_id} not found")));
        }
        Ok(())
    }
}

/// Concatenates in the UPDATE itself so concurrent appends never drop a note.
fn appended(note: &str) -> SimpleExpr {
    Expr::cust_with_values("\"notes\" || ?", [note.to_string()])
}

fn entry_from_row(row: &SqliteRow) -> Result<AuditEntry, sqlx::Error> {
    let upload_type: String = row.try_get("upload_type")?;
    let upload_type = match upload_type.as_str() {
        "CLIENT_EXCEL_DELETE" => UploadType::ClientExcelDelete,
        _ => UploadType::ClientExcelUpload,
    };
    Ok(AuditEntry {
        log_id: row.try_get("log_id")?,
        admin_id: row.try_get("admin_id")?,
        client_id: TenantId(row.try_get("client_id")?),
        upload_type,
        file_name: row.try_get("file_name")?,
        rows_inserted: row.try_get("rows_inserted")?,
        rows_updated: row.try_get("rows_updated")?,
        rows_skipped: row.try_get("rows_skipped")?,
        notes: row.try_get("notes")?,
    })
}

#[async_trait]
impl AuditLog for SqliteLogRepository {
    async fn open_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry, IngestionError> {
        let log_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let sql = Query::insert()
            .into_table(UploadLogs::Table)
            .columns([
                UploadLogs::LogId,
                UploadLogs::AdminId,
                UploadLogs::ClientId,
                UploadLogs::UploadType,
                UploadLogs::FileName,
                UploadLogs::Notes,
                UploadLogs::CreatedAt,
                UploadLogs::UpdatedAt,
            ])
            .values_panic([
                log_id.clone().into(),
                entry.admin_id.into(),
                entry.client_id.0.into(),
                entry.upload_type.as_str().into(),
                entry.file_name.clone().into(),
                entry.notes.clone().into(),
                now.clone().into(),
                now.into(),
            ])
            .to_string(SqliteQueryBuilder);

        self.execute(&sql, &log_id).await?;
        info!("Opened audit entry {} ({}) for tenant {}", log_id, entry.upload_type.as_str(), entry.client_id);

        Ok(AuditEntry {
            log_id,
            admin_id: entry.admin_id,
            client_id: entry.client_id,
            upload_type: entry.upload_type,
            file_name: entry.file_name,
            rows_inserted: 0,
            rows_updated: 0,
            rows_skipped: 0,
            notes: entry.notes,
        })
    }

    async fn record_success(&self, log_id: &str, counts: &UploadCounts, note: &str) -> Result<(), IngestionError> {
        let inserted = (counts.bookings.inserted + counts.refunds.inserted) as i64;
        let updated = (counts.bookings.updated + counts.refunds.updated) as i64;
        let skipped = (counts.bookings.skipped + counts.refunds.skipped) as i64;

        let sql = Query::update()
            .table(UploadLogs::Table)
            .value(UploadLogs::RowsInserted, inserted)
            .value(UploadLogs::RowsUpdated, updated)
            .value(UploadLogs::RowsSkipped, skipped)
            .value(UploadLogs::Notes, appended(note))
            .value(UploadLogs::UpdatedAt, Utc::now().to_rfc3339())
            .and_where(Expr::col(UploadLogs::LogId).eq(log_id))
            .to_string(SqliteQueryBuilder);

        self.execute(&sql, log_id).await?;
        debug!("Audit entry {} marked successful", log_id);
        Ok(())
    }

    async fn append_note(&self, log_id: &str, note: &str) -> Result<(), IngestionError> {
        let sql = Query::update()
            .table(UploadLogs::Table)
            .value(UploadLogs::Notes, appended(note))
            .value(UploadLogs::UpdatedAt, Utc::now().to_rfc3339())
            .and_where(Expr::col(UploadLogs::LogId).eq(log_id))
            .to_string(SqliteQueryBuilder);

        self.execute(&sql, log_id).await?;
        debug!("Appended note to audit entry {}", log_id);
        Ok(())
    }

    async fn find_entry(&self, log_id: &str) -> Result<Option<AuditEntry>, IngestionError> {
        let sql = Query::select()
            .columns([
                UploadLogs::LogId,
                UploadLogs::AdminId,
                UploadLogs::ClientId,
                UploadLogs::UploadType,
                UploadLogs::FileName,
                UploadLogs::RowsInserted,
                UploadLogs::RowsUpdated,
                UploadLogs::RowsSkipped,
                UploadLogs::Notes,
            ])
            .from(UploadLogs::Table)
            .and_where(Expr::col(UploadLogs::LogId).eq(log_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&sql).fetch_optional(&self.pool).await.map_err(map_sqlx_error)?;
        row.as_ref().map(entry_from_row).transpose().map_err(map_sqlx_error)
    }
}
