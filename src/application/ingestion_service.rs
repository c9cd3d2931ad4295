use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::application::batch_upsert::BatchUpsertEngine;
use crate::domain::{
    dates::DateContext,
    error::{IngestionError, SheetError},
    headers::{resolve_header, SheetRule},
    models::{
        AdminSession, BookingRecord, NewAuditEntry, RawSheet, RefundRecord, Role, Tenant, TenantId,
        TenantRecordCounts, UploadCounts, UploadOutcome, UploadPreview, UploadType, UploadedFile, Workbook, WorkbookSource,
        WriteMode,
    },
    normalizer::{normalize_sheet, NormalizedRecord},
    ports::{AuditLog, RecordStore, TenantRepository, WorkbookParser},
};

/// Knobs of the upload pipeline, built from the application config.
#[derive(Debug, Clone)]
pub struct IngestionSettings {
    pub bookings_sheet: SheetRule,
    pub refunds_sheet: SheetRule,
    pub preview_rows: usize,
    pub dates: DateContext,
}

/// Rows arrive either as a raw file or already parsed on the client.
#[derive(Debug, Clone)]
pub enum UploadPayload {
    File(UploadedFile),
    Rows {
        file_name: Option<String>,
        bookings: Vec<Map<String, Value>>,
        refunds: Vec<Map<String, Value>>,
    },
}

impl UploadPayload {
    pub fn file_name(&self) -> Option<&str> {
        match self {
            UploadPayload::File(file) => Some(file.file_name.as_str()),
            UploadPayload::Rows { file_name, .. } => file_name.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub session: AdminSession,
    pub tenant: TenantId,
    pub mode: WriteMode,
    pub payload: UploadPayload,
}

pub struct IngestionService {
    parser: Arc<dyn WorkbookParser>,
    tenant_repo: Arc<dyn TenantRepository>,
    data_repo: Arc<dyn RecordStore>,
    log_repo: Arc<dyn AuditLog>,
    engine: BatchUpsertEngine,
    settings: IngestionSettings,
}

impl IngestionService {
    pub fn new(
        parser: Arc<dyn WorkbookParser>,
        tenant_repo: Arc<dyn TenantRepository>,
        data_repo: Arc<dyn RecordStore>,
        log_repo: Arc<dyn AuditLog>,
        engine: BatchUpsertEngine,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            parser,
            tenant_repo,
            data_repo,
            log_repo,
            engine,
            settings,
        }
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, IngestionError> {
        let file_name = request.payload.file_name().map(str::to_string);
        info!(
            "Starting upload for tenant {} by admin {} (file {:?}, mode {:?})",
            request.tenant, request.session.admin_id, file_name, request.mode
        );

        // Step 1: Authorize, then open the audit entry before anything can fail
        authorize(&request.session)?;
        debug!("Step 1: Opening audit entry");
        let entry = self
            .log_repo
            .open_entry(NewAuditEntry {
                admin_id: request.session.admin_id,
                client_id: request.tenant,
                upload_type: UploadType::ClientExcelUpload,
                file_name: file_name.clone(),
                notes: format!(
                    "Upload of {} for tenant {} (mode {:?})",
                    file_name.as_deref().unwrap_or("parsed rows"),
                    request.tenant,
                    request.mode
                ),
            })
            .await?;

        match self.apply_upload(request.tenant, request.mode, request.payload).await {
            Ok((counts, preview)) => {
                let note = format!(
                    " → SUCCESS: bookings {}/{}/{}, refunds {}/{}/{} (inserted/updated/skipped)",
                    counts.bookings.inserted,
                    counts.bookings.updated,
                    counts.bookings.skipped,
                    counts.refunds.inserted,
                    counts.refunds.updated,
                    counts.refunds.skipped
                );
                if let Err(e) = self.log_repo.record_success(&entry.log_id, &counts, &note).await {
                    error!("Failed to record success on audit entry {}: {}", entry.log_id, e);
                }
                info!("✅ Upload for tenant {} complete{}", request.tenant, note);
                Ok(UploadOutcome {
                    success: true,
                    bookings: counts.bookings,
                    refunds: counts.refunds,
                    preview,
                })
            }
            Err(e) => {
                error!("Upload for tenant {} failed: {}", request.tenant, e);
                self.record_failure(&entry.log_id, &e).await;
                Err(e)
            }
        }
    }

    /// Steps 2 to 4 of an upload. Any error here is appended to the audit entry.
    async fn apply_upload(
        &self,
        tenant_id: TenantId,
        mode: WriteMode,
        payload: UploadPayload,
    ) -> Result<(UploadCounts, UploadPreview), IngestionError> {
        // Step 2: Fetch the tenant
        let tenant = self.require_tenant(tenant_id).await?;
        debug!("Step 2: Tenant {} is '{}'", tenant.client_id, tenant.company_name);

        // Step 3: Parse and normalize; nothing is written if this fails
        debug!("Step 3: Parsing payload");
        let (bookings, refunds) = self.parse_payload(payload).await.map_err(|e| {
            error!("Failed to parse upload for tenant {}: {}", tenant_id, e);
            e
        })?;
        if bookings.is_empty() && refunds.is_empty() {
            warn!("Upload for tenant {} has no rows with an identifier", tenant_id);
            return Err(IngestionError::Validation(
                "No booking or refund rows with a PNR were found".to_string(),
            ));
        }
        info!(
            "Parsed {} bookings and {} refunds for '{}'",
            bookings.len(),
            refunds.len(),
            tenant.company_name
        );

        let preview = UploadPreview {
            bookings: bookings.iter().take(self.settings.preview_rows).cloned().collect(),
            refunds: refunds.iter().take(self.settings.preview_rows).cloned().collect(),
        };

        // Step 4: Check and write in one transaction
        debug!("Step 4: Applying batch");
        let counts = self
            .engine
            .upsert(self.data_repo.as_ref(), tenant_id, mode, bookings, refunds)
            .await?;
        Ok((counts, preview))
    }

    /// Whether the tenant already holds data, with per-type counts.
    pub async fn existing_data(&self, session: &AdminSession, tenant: TenantId) -> Result<TenantRecordCounts, IngestionError> {
        authorize(session)?;
        let counts = self.data_repo.counts_for_tenant(tenant).await?;
        debug!("Existence check for tenant {}: {:?}", tenant, counts);
        Ok(counts)
    }

    /// Removes all ingested rows of a tenant. Returns the number deleted.
    pub async fn clear_tenant(&self, session: &AdminSession, tenant: TenantId) -> Result<u64, IngestionError> {
        authorize(session)?;
        let entry = self
            .log_repo
            .open_entry(NewAuditEntry {
                admin_id: session.admin_id,
                client_id: tenant,
                upload_type: UploadType::ClientExcelDelete,
                file_name: None,
                notes: format!("Delete all bookings and refunds of tenant {tenant}"),
            })
            .await?;

        let cleared = match self.require_tenant(tenant).await {
            Ok(found) => {
                info!("Clearing ingested data of tenant {} ('{}')", tenant, found.company_name);
                self.engine.clear(self.data_repo.as_ref(), tenant).await
            }
            Err(e) => Err(e),
        };

        match cleared {
            Ok(deleted) => {
                let note = format!(" → SUCCESS: {deleted} row(s) deleted");
                if let Err(e) = self.log_repo.append_note(&entry.log_id, &note).await {
                    error!("Failed to record success on audit entry {}: {}", entry.log_id, e);
                }
                info!("✅ Cleared {} rows for tenant {}", deleted, tenant);
                Ok(deleted)
            }
            Err(e) => {
                error!("Clearing tenant {} failed: {}", tenant, e);
                self.record_failure(&entry.log_id, &e).await;
                Err(e)
            }
        }
    }

    async fn record_failure(&self, log_id: &str, failure: &IngestionError) {
        if let Err(e) = self.log_repo.append_note(log_id, &format!("\nERROR: {failure}")).await {
            error!("Failed to append failure to audit entry {}: {}", log_id, e);
        }
    }

    async fn require_tenant(&self, id: TenantId) -> Result<Tenant, IngestionError> {
        match self.tenant_repo.find_tenant(id).await {
            Ok(Some(tenant)) => Ok(tenant),
            Ok(None) => {
                warn!("Tenant {} not found", id);
                Err(IngestionError::TenantNotFound(id))
            }
            Err(e) => {
                error!("Error retrieving tenant {}: {}", id, e);
                Err(e)
            }
        }
    }

    async fn parse_payload(
        &self,
        payload: UploadPayload,
    ) -> Result<(Vec<BookingRecord>, Vec<RefundRecord>), IngestionError> {
        match payload {
            UploadPayload::File(file) => {
                let parser = Arc::clone(&self.parser);
                let file_name = file.file_name.clone();
                let workbook = tokio::task::spawn_blocking(move || parser.parse(&file))
                    .await
                    .map_err(|e| {
                        error!("Parser task for '{}' failed: {}", file_name, e);
                        IngestionError::Unexpected(e.to_string())
                    })??;
                Ok(self.extract_records(&workbook)?)
            }
            UploadPayload::Rows { bookings, refunds, .. } => {
                let booking_rows = normalize_json_rows::<BookingRecord>("bookings", &bookings, &self.settings.dates)?;
                let refund_rows = normalize_json_rows::<RefundRecord>("refunds", &refunds, &self.settings.dates)?;
                Ok((booking_rows, refund_rows))
            }
        }
    }

    /// Picks the bookings and refunds sheets. At least one must exist; a
    /// located sheet without its identifier column fails the whole upload.
    fn extract_records(&self, workbook: &Workbook) -> Result<(Vec<BookingRecord>, Vec<RefundRecord>), SheetError> {
        let (bookings_sheet, refunds_sheet) = match workbook.source {
            // A delimited file is one sheet; its identifier column says which kind it holds.
            WorkbookSource::DelimitedText => match workbook.sheets.first() {
                Some(sheet) => {
                    if resolve_header(&sheet.headers, BookingRecord::IDENTIFIER_HEADER, &sheet.name)?.is_some() {
                        (Some(sheet), None)
                    } else {
                        (None, Some(sheet))
                    }
                }
                None => (None, None),
            },
            WorkbookSource::Spreadsheet => (
                self.settings.bookings_sheet.locate(workbook).ok(),
                self.settings.refunds_sheet.locate(workbook).ok(),
            ),
        };

        if bookings_sheet.is_none() && refunds_sheet.is_none() {
            return Err(SheetError::SheetNotFound {
                expected: format!("{} or {}", self.settings.bookings_sheet.label, self.settings.refunds_sheet.label),
            });
        }

        let bookings = normalize_optional::<BookingRecord>(bookings_sheet, &self.settings.dates)?;
        let refunds = normalize_optional::<RefundRecord>(refunds_sheet, &self.settings.dates)?;
        Ok((bookings, refunds))
    }
}

fn authorize(session: &AdminSession) -> Result<(), IngestionError> {
    if session.role != Role::Admin {
        warn!("Rejecting non-admin caller {}", session.admin_id);
        return Err(IngestionError::Unauthorized);
    }
    Ok(())
}

fn normalize_optional<R: NormalizedRecord>(sheet: Option<&RawSheet>, dates: &DateContext) -> Result<Vec<R>, SheetError> {
    let Some(sheet) = sheet else {
        debug!("No {} sheet in workbook", R::KIND);
        return Ok(Vec::new());
    };
    let rows = normalize_sheet::<R>(sheet, dates)?;
    debug!(
        "Sheet '{}': {} {} rows, {} without identifier",
        sheet.name,
        rows.records.len(),
        R::KIND,
        rows.blank_identifier_rows
    );
    Ok(rows.records)
}

fn normalize_json_rows<R: NormalizedRecord>(
    name: &str,
    rows: &[Map<String, Value>],
    dates: &DateContext,
) -> Result<Vec<R>, SheetError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let sheet = RawSheet::from_json_rows(name, rows);
    normalize_optional::<R>(Some(&sheet), dates)
}
