use async_trait::async_trait;
use mongodb::{
    bson::{self, doc, DateTime, Document},
    Client, Collection,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{map_mongo_error, UPLOAD_LOGS};
use crate::domain::{
    error::IngestionError,
    models::{AuditEntry, NewAuditEntry, UploadCounts},
    ports::AuditLog,
};

pub struct MongoLogRepository {
    collection: Collection<Document>,
}

impl MongoLogRepository {
    pub fn new(client: Client, database: String) -> Self {
        debug!("Initializing MongoDB log repository for database: {}", database);
        let collection = client.database(&database).collection(UPLOAD_LOGS);
        Self { collection }
    }

    async fn update(&self, log_id: &str, set: Document) -> Result<(), IngestionError> {
        let result = self
            .collection
            .update_one(doc! { "log_id": log_id }, vec![doc! { "$set": set }], None)
            .await
            .map_err(|e| {
                error!("Failed to update audit entry {}: {}", log_id, e);
                map_mongo_error(e)
            })?;
        if result.matched_count == 0 {
            return Err(IngestionError::Unexpected(format!("audit entry {log_id} not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditLog for MongoLogRepository {
    async fn open_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry, IngestionError> {
        let audit = AuditEntry {
            log_id: Uuid::new_v4().to_string(),
            admin_id: entry.admin_id,
            client_id: entry.client_id,
            upload_type: entry.upload_type,
            file_name: entry.file_name,
            rows_inserted: 0,
            rows_updated: 0,
            rows_skipped: 0,
            notes: entry.notes,
        };

        let mut document = bson::to_document(&audit).map_err(|e| IngestionError::Unexpected(e.to_string()))?;
        let now = DateTime::now();
        document.insert("created_at", now);
        document.insert("updated_at", now);

        self.collection.insert_one(document, None).await.map_err(|e| {
            error!("Failed to open audit entry for tenant {}: {}", audit.client_id, e);
            map_mongo_error(e)
        })?;
        info!("Opened audit entry {} ({}) for tenant {}", audit.log_id, audit.upload_type.as_str(), audit.client_id);
        Ok(audit)
    }

    async fn record_success(&self, log_id: &str, counts: &UploadCounts, note: &str) -> Result<(), IngestionError> {
        let set = doc! {
            "rows_inserted": (counts.bookings.inserted + counts.refunds.inserted) as i64,
            "rows_updated": (counts.bookings.updated + counts.refunds.updated) as i64,
            "rows_skipped": (counts.bookings.skipped + counts.refunds.skipped) as i64,
            "notes": { "$concat": ["$notes", note] },
            "updated_at": "$$NOW",
        };
        self.update(log_id, set).await?;
        debug!("Audit entry {} marked successful", log_id);
        Ok(())
    }

    async fn append_note(&self, log_id: &str, note: &str) -> Result<(), IngestionError> {
        let set = doc! {
            "notes": { "$concat": ["$notes", note] },
            "updated_at": "$$NOW",
        };
        self.update(log_id, set).await?;
        debug!("Appended note to audit entry {}", log_id);
        Ok(())
    }

    async fn find_entry(&self, log_id: &str) -> Result<Option<AuditEntry>, IngestionError> {
        let document = self
            .collection
            .find_one(doc! { "log_id": log_id }, None)
            .await
            .map_err(map_mongo_error)?;

        document
            .map(bson::from_document::<AuditEntry>)
            .transpose()
            .map_err(|e| IngestionError::Unexpected(e.to_string()))
    }
}
