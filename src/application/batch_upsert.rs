use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::application::conflict_checker::{ConflictChecker, Partition};
use crate::domain::{
    error::IngestionError,
    models::{BookingRecord, KindCounts, RefundRecord, TenantId, UploadCounts, WriteMode},
    normalizer::NormalizedRecord,
    ports::{RecordStore, RecordTransaction},
};

/// Runs the conflict check and every write of one batch inside a single
/// transaction bounded by `timeout`. Nothing is visible unless all of it is.
#[derive(Debug, Clone, Copy)]
pub struct BatchUpsertEngine {
    checker: ConflictChecker,
    timeout: Duration,
}

impl BatchUpsertEngine {
    pub fn new(checker: ConflictChecker, timeout: Duration) -> Self {
        Self { checker, timeout }
    }

    pub async fn upsert(
        &self,
        store: &dyn RecordStore,
        tenant: TenantId,
        mode: WriteMode,
        bookings: Vec<BookingRecord>,
        refunds: Vec<RefundRecord>,
    ) -> Result<UploadCounts, IngestionError> {
        debug!(
            "Upserting {} bookings and {} refunds for tenant {} (mode {:?}, timeout {:?})",
            bookings.len(),
            refunds.len(),
            tenant,
            mode,
            self.timeout
        );

        // Dropping the transaction on timeout rolls it back.
        let attempt = async {
            let mut tx = store.begin().await?;
            match self.apply(tx.as_mut(), tenant, mode, bookings, refunds).await {
                Ok(counts) => {
                    tx.commit().await?;
                    Ok(counts)
                }
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!("Rollback after failure also failed: {}", rollback_err);
                    }
                    Err(e)
                }
            }
        };

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                error!("Upsert for tenant {} exceeded {:?}", tenant, self.timeout);
                Err(IngestionError::TransactionTimeout(self.timeout))
            }
        }
    }

    /// Deletes every booking and refund of the tenant and resets its
    /// ingested-data flag, under the same timeout.
    pub async fn clear(&self, store: &dyn RecordStore, tenant: TenantId) -> Result<u64, IngestionError> {
        let attempt = async {
            let mut tx = store.begin().await?;
            let deleted = match tx.delete_all_for_tenant(tenant).await {
                Ok(deleted) => deleted,
                Err(e) => {
                    let _ = tx.rollback().await;
                    return Err(e);
                }
            };
            if let Err(e) = tx.set_tenant_has_excel(tenant, false).await {
                let _ = tx.rollback().await;
                return Err(e);
            }
            tx.commit().await?;
            Ok(deleted)
        };

        tokio::time::timeout(self.timeout, attempt).await.unwrap_or_else(|_| {
            error!("Clearing tenant {} exceeded {:?}", tenant, self.timeout);
            Err(IngestionError::TransactionTimeout(self.timeout))
        })
    }

    async fn apply(
        &self,
        tx: &mut dyn RecordTransaction,
        tenant: TenantId,
        mode: WriteMode,
        bookings: Vec<BookingRecord>,
        refunds: Vec<RefundRecord>,
    ) -> Result<UploadCounts, IngestionError> {
        let outcome = self.checker.check(&mut *tx, tenant, mode, bookings, refunds).await?;
        if outcome.has_conflict() {
            return Err(IngestionError::CrossTenantConflict {
                identifiers: outcome.conflicts.into_iter().collect(),
            });
        }

        if mode == WriteMode::Replace {
            tx.delete_all_for_tenant(tenant).await?;
        }

        let counts = UploadCounts {
            bookings: write_partition(tx, tenant, mode, outcome.bookings).await?,
            refunds: write_partition(tx, tenant, mode, outcome.refunds).await?,
        };

        if counts.bookings.inserted + counts.refunds.inserted > 0 {
            tx.set_tenant_has_excel(tenant, true).await?;
        }

        info!(
            "✅ Batch applied for tenant {}: bookings {:?}, refunds {:?}",
            tenant, counts.bookings, counts.refunds
        );
        Ok(counts)
    }
}

async fn write_partition<R: NormalizedRecord>(
    tx: &mut dyn RecordTransaction,
    tenant: TenantId,
    mode: WriteMode,
    partition: Partition<R>,
) -> Result<KindCounts, IngestionError> {
    let mut counts = KindCounts {
        skipped: partition.in_batch_duplicates,
        ..KindCounts::default()
    };

    if !partition.fresh.is_empty() {
        counts.inserted = tx.insert_records(tenant, R::batch(&partition.fresh)).await? as usize;
    }

    match mode {
        WriteMode::Update if !partition.existing.is_empty() => {
            counts.updated = tx.update_records(tenant, R::batch(&partition.existing)).await? as usize;
        }
        _ => counts.skipped += partition.existing.len(),
    }

    debug!("{} counts for tenant {}: {:?}", R::KIND, tenant, counts);
    Ok(counts)
}
