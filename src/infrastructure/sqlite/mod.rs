//! Relational backend on SQLite.
//!
//! Queries are built with sea-query and rendered with values inlined, so no
//! statement hits the driver's bound-parameter ceiling. Identifier lookups are
//! still chunked by the caller.

pub mod data_repo;
pub mod log_repo;
pub mod schema;
pub mod tenant_repo;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::domain::error::IngestionError;
use schema::{CREATE_BOOKINGS_TABLE, CREATE_CLIENTS_TABLE, CREATE_REFUNDS_TABLE, CREATE_UPLOAD_LOGS_TABLE};

pub use data_repo::SqliteDataRepository;
pub use log_repo::SqliteLogRepository;
pub use tenant_repo::SqliteTenantRepository;

/// Opens a pool for `url` (e.g. `sqlite://data.db` or `sqlite::memory:`).
/// In-memory databases are private per connection, so they get a single one.
pub async fn connect(url: &str) -> Result<SqlitePool, IngestionError> {
    debug!("Connecting to SQLite at {}", url);
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| {
            error!("Invalid SQLite URL '{}': {}", url, e);
            IngestionError::Config(e.to_string())
        })?
        .create_if_missing(true)
        .foreign_keys(true);

    let in_memory = url.contains(":memory:");
    let max_connections = if in_memory { 1 } else { 5 };
    let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
    if in_memory {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| {
            error!("Failed to open SQLite pool: {}", e);
            map_sqlx_error(e)
        })?;

    info!("✅ SQLite pool ready ({} connection(s))", max_connections);
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), IngestionError> {
    debug!("Applying SQLite schema");
    for ddl in [
        CREATE_CLIENTS_TABLE,
        CREATE_BOOKINGS_TABLE,
        CREATE_REFUNDS_TABLE,
        CREATE_UPLOAD_LOGS_TABLE,
    ] {
        sqlx::raw_sql(ddl).execute(pool).await.map_err(|e| {
            error!("Failed to apply schema: {}", e);
            map_sqlx_error(e)
        })?;
    }
    info!("✅ SQLite schema applied");
    Ok(())
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> IngestionError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => IngestionError::UniqueConflict(db.message().to_string()),
        sqlx::Error::Database(db) if db.code().as_deref().is_some_and(is_busy_code) => {
            IngestionError::Transient(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => IngestionError::Transient(err.to_string()),
        _ => IngestionError::Database(err.to_string()),
    }
}

/// SQLITE_BUSY or SQLITE_LOCKED, including extended codes such as
/// SQLITE_BUSY_SNAPSHOT (517) that WAL mode reports on a write race.
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>().is_ok_and(|code| matches!(code & 0xff, 5 | 6))
}

pub(crate) fn date_text(date: Option<chrono::NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_busy_codes_are_transient() {
        for code in ["5", "6", "261", "517", "262"] {
            assert!(is_busy_code(code), "{code}");
        }
        for code in ["1", "19", "2067", "1555", "not-a-code"] {
            assert!(!is_busy_code(code), "{code}");
        }
    }
}
