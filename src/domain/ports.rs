use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::{
    error::{IngestionError, SheetError},
    models::{
        AdminSession, AuditEntry, NewAuditEntry, OwnerScope, RecordBatch, RecordKind, Tenant, TenantId,
        TenantRecordCounts, UploadCounts, UploadedFile, Workbook,
    },
};

/// Reads an uploaded file into header-keyed sheets. Pure and CPU-bound.
pub trait WorkbookParser: Send + Sync {
    fn parse(&self, file: &UploadedFile) -> Result<Workbook, SheetError>;
}

#[async_trait]
pub trait IdentifierLookup: Send {
    /// Returns the subset of `identifiers` that exist for `kind` within `scope`.
    /// Callers keep `identifiers` under the backend's parameter ceiling.
    async fn find_identifiers(
        &mut self,
        kind: RecordKind,
        identifiers: &[String],
        scope: OwnerScope,
    ) -> Result<HashSet<String>, IngestionError>;
}

/// Writes of one ingestion attempt. Dropping without commit discards them.
#[async_trait]
pub trait RecordTransaction: IdentifierLookup {
    async fn delete_all_for_tenant(&mut self, tenant: TenantId) -> Result<u64, IngestionError>;
    async fn insert_records(&mut self, tenant: TenantId, batch: RecordBatch<'_>) -> Result<u64, IngestionError>;
    /// Overwrites the stored fields of rows matched by (tenant, identifier).
    async fn update_records(&mut self, tenant: TenantId, batch: RecordBatch<'_>) -> Result<u64, IngestionError>;
    async fn set_tenant_has_excel(&mut self, tenant: TenantId, has_excel: bool) -> Result<(), IngestionError>;
    async fn commit(self: Box<Self>) -> Result<(), IngestionError>;
    async fn rollback(self: Box<Self>) -> Result<(), IngestionError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn RecordTransaction>, IngestionError>;
    async fn counts_for_tenant(&self, tenant: TenantId) -> Result<TenantRecordCounts, IngestionError>;
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, IngestionError>;
    async fn save_tenant(&self, tenant: &Tenant) -> Result<(), IngestionError>;
}

/// Append-only trail of ingestion attempts, written outside the record
/// transaction so failures stay visible.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn open_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry, IngestionError>;
    async fn record_success(&self, log_id: &str, counts: &UploadCounts, note: &str) -> Result<(), IngestionError>;
    async fn append_note(&self, log_id: &str, note: &str) -> Result<(), IngestionError>;
    async fn find_entry(&self, log_id: &str) -> Result<Option<AuditEntry>, IngestionError>;
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, bearer_token: &str) -> Option<AdminSession>;
}
