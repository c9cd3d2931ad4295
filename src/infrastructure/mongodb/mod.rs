//! Document backend on MongoDB.
//!
//! Multi-document transactions need a replica set or sharded cluster; a
//! standalone server rejects `start_transaction`.

pub mod data_repo;
pub mod log_repo;
pub mod tenant_repo;

use mongodb::{
    bson::{doc, Document},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, IndexModel,
};
use tracing::{debug, error, info};

use crate::domain::{error::IngestionError, models::RecordKind};

pub use data_repo::MongoDataRepository;
pub use log_repo::MongoLogRepository;
pub use tenant_repo::MongoTenantRepository;

pub(crate) const CLIENTS: &str = "clients";
pub(crate) const UPLOAD_LOGS: &str = "upload_logs";

const DUPLICATE_KEY: i32 = 11000;

/// (collection, identifier field) for a record kind.
pub(crate) fn kind_layout(kind: RecordKind) -> (&'static str, &'static str) {
    match kind {
        RecordKind::Booking => ("bookings", "pnr_ticket_no"),
        RecordKind::Refund => ("refunds", "pnr_no"),
    }
}

pub(crate) fn map_mongo_error(err: mongodb::error::Error) -> IngestionError {
    let duplicate = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .map_or(false, |errors| errors.iter().any(|e| e.code == DUPLICATE_KEY)),
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    };

    if duplicate {
        IngestionError::UniqueConflict(err.to_string())
    } else if err.contains_label("TransientTransactionError") || err.contains_label("RetryableWriteError") {
        IngestionError::Transient(err.to_string())
    } else {
        IngestionError::Database(err.to_string())
    }
}

/// Creates the per-tenant uniqueness indexes the ingestion pipeline relies on.
pub async fn ensure_indexes(client: &Client, database: &str) -> Result<(), IngestionError> {
    debug!("Ensuring MongoDB indexes on database: {}", database);
    let db = client.database(database);

    for kind in [RecordKind::Booking, RecordKind::Refund] {
        let (collection_name, identifier) = kind_layout(kind);
        let collection = db.collection::<Document>(collection_name);

        let per_tenant = IndexModel::builder()
            .keys(doc! { "client_id": 1, identifier: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let by_identifier = IndexModel::builder().keys(doc! { identifier: 1 }).build();

        collection
            .create_indexes([per_tenant, by_identifier], None)
            .await
            .map_err(|e| {
                error!("Failed to create indexes on {}: {}", collection_name, e);
                map_mongo_error(e)
            })?;
    }

    let booking_id = IndexModel::builder()
        .keys(doc! { "client_id": 1, "booking_id": 1 })
        .options(
            IndexOptions::builder()
                .unique(true)
                .partial_filter_expression(doc! { "booking_id": { "$type": "string" } })
                .build(),
        )
        .build();
    db.collection::<Document>("bookings")
        .create_index(booking_id, None)
        .await
        .map_err(map_mongo_error)?;

    let tenant_id = IndexModel::builder()
        .keys(doc! { "client_id": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    db.collection::<Document>(CLIENTS)
        .create_index(tenant_id, None)
        .await
        .map_err(map_mongo_error)?;

    info!("✅ MongoDB indexes ready");
    Ok(())
}
