use std::collections::HashSet;

use async_trait::async_trait;
use sea_query::{DynIden, Expr, Iden, IntoIden, Query, SimpleExpr, SqliteQueryBuilder};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, error, info};

use super::schema::{Bookings, Clients, Refunds};
use super::{date_text, map_sqlx_error};
use crate::domain::{
    error::IngestionError,
    models::{BookingRecord, OwnerScope, RecordBatch, RecordKind, RefundRecord, TenantId, TenantRecordCounts},
    normalizer::NormalizedRecord,
    ports::{IdentifierLookup, RecordStore, RecordTransaction},
};

/// Rows per multi-row INSERT statement.
const INSERT_CHUNK: usize = 200;

/// Column layout of one record table.
trait SqlRecord: NormalizedRecord {
    type Column: Iden + Copy + 'static;

    const TABLE: Self::Column;
    const OWNER: Self::Column;
    const IDENTIFIER: Self::Column;

    /// Every stored column except the owner and the identifier.
    fn fields(&self) -> Vec<(Self::Column, SimpleExpr)>;
}

impl SqlRecord for BookingRecord {
    type Column = Bookings;

    const TABLE: Bookings = Bookings::Table;
    const OWNER: Bookings = Bookings::ClientId;
    const IDENTIFIER: Bookings = Bookings::PnrTicketNo;

    fn fields(&self) -> Vec<(Bookings, SimpleExpr)> {
        vec![
            (Bookings::SerialNo, self.serial_no.into()),
            (Bookings::DateOfBooking, date_text(self.date_of_booking).into()),
            (Bookings::DateOfTravel, date_text(self.date_of_travel).into()),
            (Bookings::PassengerName, self.passenger_name.clone().into()),
            (Bookings::Sector, self.sector.clone().into()),
            (Bookings::OriginStn, self.origin_stn.clone().into()),
            (Bookings::DestinationStn, self.destination_stn.clone().into()),
            (Bookings::Class, self.class.clone().into()),
            (Bookings::Quota, self.quota.clone().into()),
            (Bookings::NoOfPax, self.no_of_pax.into()),
            (Bookings::TicketAmount, self.ticket_amount.into()),
            (Bookings::SCharges, self.s_charges.into()),
            (Bookings::Gst18, self.gst_18.into()),
            (Bookings::TotalAmount, self.total_amount.into()),
            (Bookings::BookingId, self.booking_id.clone().into()),
            (Bookings::VendeeCorporate, self.vendee_corporate.clone().into()),
            (Bookings::SubCorporate, self.sub_corporate.clone().into()),
            (Bookings::SubEntity, self.sub_entity.clone().into()),
            (Bookings::NttBillNo, self.ntt_bill_no.clone().into()),
            (Bookings::InvoiceNo, self.invoice_no.clone().into()),
            (Bookings::StatementPeriod, self.statement_period.clone().into()),
            (Bookings::GstNo, self.gst_no.clone().into()),
            (Bookings::GstState, self.gst_state.clone().into()),
            (Bookings::Cgst9, self.cgst_9.into()),
            (Bookings::Sgst9, self.sgst_9.into()),
            (Bookings::Igst18, self.igst_18.into()),
            (Bookings::Utgst, self.utgst.into()),
        ]
    }
}

impl SqlRecord for RefundRecord {
    type Column = Refunds;

    const TABLE: Refunds = Refunds::Table;
    const OWNER: Refunds = Refunds::ClientId;
    const IDENTIFIER: Refunds = Refunds::PnrNo;

    fn fields(&self) -> Vec<(Refunds, SimpleExpr)> {
        vec![
            (Refunds::SerialNo, self.serial_no.into()),
            (Refunds::RefundDate, date_text(self.refund_date).into()),
            (Refunds::RefundAmount, self.refund_amount.into()),
            (Refunds::VendeeCorporate, self.vendee_corporate.clone().into()),
            (Refunds::SubCorporate, self.sub_corporate.clone().into()),
            (Refunds::SubEntity, self.sub_entity.clone().into()),
        ]
    }
}

/// (table, owner column, identifier column) for a record kind.
fn kind_columns(kind: RecordKind) -> (DynIden, DynIden, DynIden) {
    match kind {
        RecordKind::Booking => (
            Bookings::Table.into_iden(),
            Bookings::ClientId.into_iden(),
            Bookings::PnrTicketNo.into_iden(),
        ),
        RecordKind::Refund => (
            Refunds::Table.into_iden(),
            Refunds::ClientId.into_iden(),
            Refunds::PnrNo.into_iden(),
        ),
    }
}

async fn insert_rows<R: SqlRecord>(
    conn: &mut SqliteConnection,
    tenant: TenantId,
    rows: &[R],
) -> Result<u64, IngestionError> {
    let mut inserted = 0;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let Some(first) = chunk.first() else {
            continue;
        };
        let columns: Vec<R::Column> = [R::OWNER, R::IDENTIFIER]
            .into_iter()
            .chain(first.fields().into_iter().map(|(column, _)| column))
            .collect();

        let mut insert = Query::insert();
        insert.into_table(R::TABLE).columns(columns);
        for row in chunk {
            let values: Vec<SimpleExpr> = [SimpleExpr::from(tenant.0), SimpleExpr::from(row.identifier())]
                .into_iter()
                .chain(row.fields().into_iter().map(|(_, value)| value))
                .collect();
            insert.values_panic(values);
        }

        let sql = insert.to_string(SqliteQueryBuilder);
        let result = sqlx::query(&sql).execute(&mut *conn).await.map_err(|e| {
            error!("Failed to insert {} {} rows for tenant {}: {}", chunk.len(), R::KIND, tenant, e);
            map_sqlx_error(e)
        })?;
        inserted += result.rows_affected();
        debug!("Inserted chunk of {} {} rows", chunk.len(), R::KIND);
    }
    Ok(inserted)
}

async fn update_rows<R: SqlRecord>(
    conn: &mut SqliteConnection,
    tenant: TenantId,
    rows: &[R],
) -> Result<u64, IngestionError> {
    let mut updated = 0;
    for row in rows {
        let sql = Query::update()
            .table(R::TABLE)
            .values(row.fields())
            .and_where(Expr::col(R::OWNER).eq(tenant.0))
            .and_where(Expr::col(R::IDENTIFIER).eq(row.identifier()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&sql).execute(&mut *conn).await.map_err(|e| {
            error!("Failed to update {} '{}' for tenant {}: {}", R::KIND, row.identifier(), tenant, e);
            map_sqlx_error(e)
        })?;
        updated += result.rows_affected();
    }
    Ok(updated)
}

pub struct SqliteDataRepository {
    pool: SqlitePool,
}

impl SqliteDataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        debug!("Initializing SQLite data repository");
        Self { pool }
    }

    async fn count(&self, kind: RecordKind, tenant: TenantId) -> Result<u64, IngestionError> {
        let (table, owner, identifier) = kind_columns(kind);
        let sql = Query::select()
            .expr(Expr::col(identifier).count())
            .from(table)
            .and_where(Expr::col(owner).eq(tenant.0))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&sql).fetch_one(&self.pool).await.map_err(map_sqlx_error)?;
        let count: i64 = row.try_get(0).map_err(map_sqlx_error)?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl RecordStore for SqliteDataRepository {
    async fn begin(&self) -> Result<Box<dyn RecordTransaction>, IngestionError> {
        debug!("Beginning SQLite transaction");
        let tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            map_sqlx_error(e)
        })?;
        Ok(Box::new(SqliteDataTransaction { tx }))
    }

    async fn counts_for_tenant(&self, tenant: TenantId) -> Result<TenantRecordCounts, IngestionError> {
        let counts = TenantRecordCounts {
            bookings: self.count(RecordKind::Booking, tenant).await?,
            refunds: self.count(RecordKind::Refund, tenant).await?,
        };
        debug!("Tenant {} has {:?}", tenant, counts);
        Ok(counts)
    }
}

/// Rolls back on drop unless committed.
pub struct SqliteDataTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl IdentifierLookup for SqliteDataTransaction {
    async fn find_identifiers(
        &mut self,
        kind: RecordKind,
        identifiers: &[String],
        scope: OwnerScope,
    ) -> Result<HashSet<String>, IngestionError> {
        if identifiers.is_empty() {
            return Ok(HashSet::new());
        }

        let (table, owner, identifier) = kind_columns(kind);
        let mut select = Query::select();
        select
            .distinct()
            .column(identifier.clone())
            .from(table)
            .and_where(Expr::col(identifier).is_in(identifiers.iter().map(String::as_str)));
        match scope {
            OwnerScope::Tenant(tenant) => select.and_where(Expr::col(owner).eq(tenant.0)),
            OwnerScope::OtherThan(tenant) => select.and_where(Expr::col(owner).ne(tenant.0)),
        };
        let sql = select.to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await.map_err(|e| {
            error!("Identifier lookup on {} failed: {}", kind, e);
            map_sqlx_error(e)
        })?;

        let found = rows
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<HashSet<_>, _>>()
            .map_err(map_sqlx_error)?;
        debug!("{} of {} {} identifiers matched {:?}", found.len(), identifiers.len(), kind, scope);
        Ok(found)
    }
}

#[async_trait]
impl RecordTransaction for SqliteDataTransaction {
    async fn delete_all_for_tenant(&mut self, tenant: TenantId) -> Result<u64, IngestionError> {
        let mut deleted = 0;
        for kind in [RecordKind::Booking, RecordKind::Refund] {
            let (table, owner, _) = kind_columns(kind);
            let sql = Query::delete()
                .from_table(table)
                .and_where(Expr::col(owner).eq(tenant.0))
                .to_string(SqliteQueryBuilder);
            let result = sqlx::query(&sql).execute(&mut *self.tx).await.map_err(|e| {
                error!("Failed to delete {} for tenant {}: {}", kind, tenant, e);
                map_sqlx_error(e)
            })?;
            deleted += result.rows_affected();
        }
        info!("Deleted {} existing rows for tenant {}", deleted, tenant);
        Ok(deleted)
    }

    async fn insert_records(&mut self, tenant: TenantId, batch: RecordBatch<'_>) -> Result<u64, IngestionError> {
        match batch {
            RecordBatch::Bookings(rows) => insert_rows(&mut *self.tx, tenant, rows).await,
            RecordBatch::Refunds(rows) => insert_rows(&mut *self.tx, tenant, rows).await,
        }
    }

    async fn update_records(&mut self, tenant: TenantId, batch: RecordBatch<'_>) -> Result<u64, IngestionError> {
        match batch {
            RecordBatch::Bookings(rows) => update_rows(&mut *self.tx, tenant, rows).await,
            RecordBatch::Refunds(rows) => update_rows(&mut *self.tx, tenant, rows).await,
        }
    }

    async fn set_tenant_has_excel(&mut self, tenant: TenantId, has_excel: bool) -> Result<(), IngestionError> {
        let sql = Query::update()
            .table(Clients::Table)
            .value(Clients::HasExcel, has_excel)
            .and_where(Expr::col(Clients::ClientId).eq(tenant.0))
            .to_string(SqliteQueryBuilder);
        sqlx::query(&sql).execute(&mut *self.tx).await.map_err(map_sqlx_error)?;
        debug!("Tenant {} has_excel = {}", tenant, has_excel);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), IngestionError> {
        self.tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            map_sqlx_error(e)
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), IngestionError> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}
