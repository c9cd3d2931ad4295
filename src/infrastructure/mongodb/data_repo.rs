use std::collections::HashSet;

use async_trait::async_trait;
use mongodb::{
    bson::{doc, Bson, Document},
    Client, ClientSession, Collection,
};
use serde::Serialize;
use tracing::{debug, error, info};

use super::{kind_layout, map_mongo_error, CLIENTS};
use crate::domain::{
    error::IngestionError,
    models::{OwnerScope, RecordBatch, RecordKind, TenantId, TenantRecordCounts},
    normalizer::NormalizedRecord,
    ports::{IdentifierLookup, RecordStore, RecordTransaction},
};

pub struct MongoDataRepository {
    client: Client,
    database: String,
}

impl MongoDataRepository {
    pub fn new(client: Client, database: String) -> Self {
        debug!("Initializing MongoDB data repository for database: {}", database);
        Self { client, database }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.database).collection(name)
    }
}

#[async_trait]
impl RecordStore for MongoDataRepository {
    async fn begin(&self) -> Result<Box<dyn RecordTransaction>, IngestionError> {
        debug!("Starting MongoDB session and transaction");
        let mut session = self.client.start_session(None).await.map_err(|e| {
            error!("Failed to start MongoDB session: {}", e);
            map_mongo_error(e)
        })?;
        session.start_transaction(None).await.map_err(|e| {
            error!("Failed to start MongoDB transaction: {}", e);
            map_mongo_error(e)
        })?;

        Ok(Box::new(MongoDataTransaction {
            session,
            database: self.client.database(&self.database),
        }))
    }

    async fn counts_for_tenant(&self, tenant: TenantId) -> Result<TenantRecordCounts, IngestionError> {
        let mut counts = TenantRecordCounts::default();
        for kind in [RecordKind::Booking, RecordKind::Refund] {
            let (name, _) = kind_layout(kind);
            let count = self
                .collection(name)
                .count_documents(doc! { "client_id": tenant.0 }, None)
                .await
                .map_err(|e| {
                    error!("Failed to count {} for tenant {}: {}", kind, tenant, e);
                    map_mongo_error(e)
                })?;
            match kind {
                RecordKind::Booking => counts.bookings = count,
                RecordKind::Refund => counts.refunds = count,
            }
        }
        debug!("Tenant {} has {:?}", tenant, counts);
        Ok(counts)
    }
}

/// Dropping the session without committing aborts the transaction.
pub struct MongoDataTransaction {
    session: ClientSession,
    database: mongodb::Database,
}

impl MongoDataTransaction {
    fn collection(&self, kind: RecordKind) -> (Collection<Document>, &'static str) {
        let (name, identifier) = kind_layout(kind);
        (self.database.collection(name), identifier)
    }
}

/// Record fields as BSON, without the owner.
fn record_document<R: NormalizedRecord + Serialize>(record: &R) -> Result<Document, IngestionError> {
    mongodb::bson::to_document(record).map_err(|e| {
        error!("Failed to convert {} '{}' to BSON: {}", R::KIND, record.identifier(), e);
        IngestionError::Unexpected(e.to_string())
    })
}

async fn insert_many<R: NormalizedRecord + Serialize>(
    tx: &mut MongoDataTransaction,
    tenant: TenantId,
    rows: &[R],
) -> Result<u64, IngestionError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let (collection, _) = tx.collection(R::KIND);

    let docs = rows
        .iter()
        .map(|row| {
            let mut document = record_document(row)?;
            document.insert("client_id", tenant.0);
            Ok(document)
        })
        .collect::<Result<Vec<_>, IngestionError>>()?;
    debug!("Converted {} {} rows to BSON", docs.len(), R::KIND);

    let result = collection
        .insert_many_with_session(docs, None, &mut tx.session)
        .await
        .map_err(|e| {
            error!("Failed to insert {} for tenant {}: {}", R::KIND, tenant, e);
            map_mongo_error(e)
        })?;
    Ok(result.inserted_ids.len() as u64)
}

async fn update_each<R: NormalizedRecord + Serialize>(
    tx: &mut MongoDataTransaction,
    tenant: TenantId,
    rows: &[R],
) -> Result<u64, IngestionError> {
    let (collection, identifier) = tx.collection(R::KIND);
    let mut updated = 0;

    for row in rows {
        let mut fields = record_document(row)?;
        fields.remove(identifier);
        let filter = doc! { "client_id": tenant.0, identifier: row.identifier() };

        let result = collection
            .update_one_with_session(filter, doc! { "$set": fields }, None, &mut tx.session)
            .await
            .map_err(|e| {
                error!("Failed to update {} '{}' for tenant {}: {}", R::KIND, row.identifier(), tenant, e);
                map_mongo_error(e)
            })?;
        updated += result.matched_count;
    }
    Ok(updated)
}

#[async_trait]
impl IdentifierLookup for MongoDataTransaction {
    async fn find_identifiers(
        &mut self,
        kind: RecordKind,
        identifiers: &[String],
        scope: OwnerScope,
    ) -> Result<HashSet<String>, IngestionError> {
        if identifiers.is_empty() {
            return Ok(HashSet::new());
        }
        let (collection, identifier) = self.collection(kind);

        let owner: Bson = match scope {
            OwnerScope::Tenant(tenant) => Bson::Int64(tenant.0),
            OwnerScope::OtherThan(tenant) => Bson::Document(doc! { "$ne": tenant.0 }),
        };
        let filter = doc! { identifier: { "$in": identifiers.to_vec() }, "client_id": owner };

        let values = collection
            .distinct_with_session(identifier, filter, None, &mut self.session)
            .await
            .map_err(|e| {
                error!("Identifier lookup on {} failed: {}", kind, e);
                map_mongo_error(e)
            })?;

        let found: HashSet<String> = values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(s) => Some(s),
                _ => None,
            })
            .collect();
        debug!("{} of {} {} identifiers matched {:?}", found.len(), identifiers.len(), kind, scope);
        Ok(found)
    }
}

#[async_trait]
impl RecordTransaction for MongoDataTransaction {
    async fn delete_all_for_tenant(&mut self, tenant: TenantId) -> Result<u64, IngestionError> {
        let mut deleted = 0;
        for kind in [RecordKind::Booking, RecordKind::Refund] {
            let (collection, _) = self.collection(kind);
            let result = collection
                .delete_many_with_session(doc! { "client_id": tenant.0 }, None, &mut self.session)
                .await
                .map_err(|e| {
                    error!("Failed to delete {} for tenant {}: {}", kind, tenant, e);
                    map_mongo_error(e)
                })?;
            deleted += result.deleted_count;
        }
        info!("Deleted {} existing documents for tenant {}", deleted, tenant);
        Ok(deleted)
    }

    async fn insert_records(&mut self, tenant: TenantId, batch: RecordBatch<'_>) -> Result<u64, IngestionError> {
        let inserted = match batch {
            RecordBatch::Bookings(rows) => insert_many(self, tenant, rows).await?,
            RecordBatch::Refunds(rows) => insert_many(self, tenant, rows).await?,
        };
        info!("✅ Inserted {} {} documents for tenant {}", inserted, batch.kind(), tenant);
        Ok(inserted)
    }

    async fn update_records(&mut self, tenant: TenantId, batch: RecordBatch<'_>) -> Result<u64, IngestionError> {
        match batch {
            RecordBatch::Bookings(rows) => update_each(self, tenant, rows).await,
            RecordBatch::Refunds(rows) => update_each(self, tenant, rows).await,
        }
    }

    async fn set_tenant_has_excel(&mut self, tenant: TenantId, has_excel: bool) -> Result<(), IngestionError> {
        self.database
            .collection::<Document>(CLIENTS)
            .update_one_with_session(
                doc! { "client_id": tenant.0 },
                doc! { "$set": { "has_excel": has_excel } },
                None,
                &mut self.session,
            )
            .await
            .map_err(map_mongo_error)?;
        debug!("Tenant {} has_excel = {}", tenant, has_excel);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), IngestionError> {
        let mut session = self.session;
        session.commit_transaction().await.map_err(|e| {
            error!("Failed to commit MongoDB transaction: {}", e);
            map_mongo_error(e)
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), IngestionError> {
        let mut session = self.session;
        session.abort_transaction().await.map_err(map_mongo_error)
    }
}
