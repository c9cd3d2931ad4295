use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, error, info};

use super::map_sqlx_error;
use super::schema::Clients;
use crate::domain::{
    error::IngestionError,
    models::{Tenant, TenantId},
    ports::TenantRepository,
};

pub struct SqliteTenantRepository {
    pool: SqlitePool,
}

impl SqliteTenantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        debug!("Initializing SQLite tenant repository");
        Self { pool }
    }
}

fn tenant_from_row(row: &SqliteRow) -> Result<Tenant, sqlx::Error> {
    let emails: String = row.try_get("emails")?;
    Ok(Tenant {
        client_id: TenantId(row.try_get("client_id")?),
        company_name: row.try_get("company_name")?,
        emails: serde_json::from_str(&emails).unwrap_or_default(),
        username: row.try_get("username")?,
        mobile: row.try_get("mobile")?,
        gst_number: row.try_get("gst_number")?,
        address: row.try_get("address")?,
        sub_corporate: row.try_get("sub_corporate")?,
        sub_entity: row.try_get("sub_entity")?,
        has_excel: row.try_get("has_excel")?,
    })
}

#[async_trait]
impl TenantRepository for SqliteTenantRepository {
    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, IngestionError> {
        debug!("Looking up tenant {}", id);
        let sql = Query::select()
            .columns([
                Clients::ClientId,
                Clients::CompanyName,
                Clients::Emails,
                Clients::Username,
                Clients::Mobile,
                Clients::GstNumber,
                Clients::Address,
                Clients::SubCorporate,
                Clients::SubEntity,
                Clients::HasExcel,
            ])
            .from(Clients::Table)
            .and_where(Expr::col(Clients::ClientId).eq(id.0))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&sql).fetch_optional(&self.pool).await.map_err(|e| {
            error!("Failed to query tenant {}: {}", id, e);
            map_sqlx_error(e)
        })?;

        row.as_ref().map(tenant_from_row).transpose().map_err(map_sqlx_error)
    }

    async fn save_tenant(&self, tenant: &Tenant) -> Result<(), IngestionError> {
        let emails = serde_json::to_string(&tenant.emails).map_err(|e| IngestionError::Unexpected(e.to_string()))?;
        let sql = Query::insert()
            .into_table(Clients::Table)
            .columns([
                Clients::ClientId,
                Clients::CompanyName,
                Clients::Emails,
                Clients::Username,
                Clients::Mobile,
                Clients::GstNumber,
                Clients::Address,
                Clients::SubCorporate,
                Clients::SubEntity,
                Clients::HasExcel,
            ])
            .values_panic([
                tenant.client_id.0.into(),
                tenant.company_name.clone().into(),
                emails.into(),
                tenant.username.clone().into(),
                tenant.mobile.clone().into(),
                tenant.gst_number.clone().into(),
                tenant.address.clone().into(),
                tenant.sub_corporate.clone().into(),
                tenant.sub_entity.clone().into(),
                tenant.has_excel.into(),
            ])
            .on_conflict(
                OnConflict::column(Clients::ClientId)
                    .update_columns([
                        Clients::CompanyName,
                        Clients::Emails,
                        Clients::Username,
                        Clients::Mobile,
                        Clients::GstNumber,
                        Clients::Address,
                        Clients::SubCorporate,
                        Clients::SubEntity,
                        Clients::HasExcel,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
            error!("Failed to save tenant {}: {}", tenant.client_id, e);
            map_sqlx_error(e)
        })?;
        info!("✅ Saved tenant {} ({})", tenant.client_id, tenant.company_name);
        Ok(())
    }
}
