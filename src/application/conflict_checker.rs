//! Cross-tenant conflict and same-tenant duplicate detection.
//!
//! Identifier lists are looked up in chunks and the results unioned, so the
//! outcome never depends on the chunk size.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, warn};

use crate::domain::{
    error::IngestionError,
    models::{BookingRecord, OwnerScope, RecordKind, RefundRecord, TenantId, WriteMode},
    normalizer::NormalizedRecord,
    ports::IdentifierLookup,
};

/// Rows of one record type split by what the store already holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<R> {
    /// Identifier unknown for the tenant: insert.
    pub fresh: Vec<R>,
    /// Identifier already stored for the tenant: skip or update.
    pub existing: Vec<R>,
    /// Later repeats of an identifier within the same batch.
    pub in_batch_duplicates: usize,
}

impl<R> Default for Partition<R> {
    fn default() -> Self {
        Self {
            fresh: Vec::new(),
            existing: Vec::new(),
            in_batch_duplicates: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    /// Identifiers owned by another tenant. Non-empty means the batch is rejected.
    pub conflicts: BTreeSet<String>,
    pub bookings: Partition<BookingRecord>,
    pub refunds: Partition<RefundRecord>,
}

impl CheckOutcome {
    pub fn has_conflict(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConflictChecker {
    chunk_size: usize,
}

impl ConflictChecker {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Union of per-chunk lookups over `identifiers`.
    pub async fn existing_identifiers<L: IdentifierLookup + ?Sized>(
        &self,
        lookup: &mut L,
        kind: RecordKind,
        identifiers: &[String],
        scope: OwnerScope,
    ) -> Result<HashSet<String>, IngestionError> {
        let mut found = HashSet::new();
        for (index, chunk) in identifiers.chunks(self.chunk_size).enumerate() {
            debug!(
                "Looking up {} chunk {} ({} identifiers, scope {:?})",
                kind,
                index + 1,
                chunk.len(),
                scope
            );
            found.extend(lookup.find_identifiers(kind, chunk, scope).await?);
        }
        Ok(found)
    }

    /// Read-only two-phase check. Phase two is skipped once a conflict is
    /// found, and in replace mode where every stored row is about to go.
    pub async fn check<L: IdentifierLookup + ?Sized>(
        &self,
        lookup: &mut L,
        tenant: TenantId,
        mode: WriteMode,
        bookings: Vec<BookingRecord>,
        refunds: Vec<RefundRecord>,
    ) -> Result<CheckOutcome, IngestionError> {
        let booking_ids = distinct_identifiers(&bookings);
        let refund_ids = distinct_identifiers(&refunds);
        debug!(
            "Checking {} booking and {} refund identifiers for tenant {}",
            booking_ids.len(),
            refund_ids.len(),
            tenant
        );

        let mut conflicts = BTreeSet::new();
        conflicts.extend(
            self.existing_identifiers(lookup, RecordKind::Booking, &booking_ids, OwnerScope::OtherThan(tenant))
                .await?,
        );
        conflicts.extend(
            self.existing_identifiers(lookup, RecordKind::Refund, &refund_ids, OwnerScope::OtherThan(tenant))
                .await?,
        );
        if !conflicts.is_empty() {
            warn!("{} identifier(s) already belong to another tenant", conflicts.len());
            return Ok(CheckOutcome {
                conflicts,
                bookings: Partition::default(),
                refunds: Partition::default(),
            });
        }

        let (owned_bookings, owned_refunds) = if mode == WriteMode::Replace {
            (HashSet::new(), HashSet::new())
        } else {
            (
                self.existing_identifiers(lookup, RecordKind::Booking, &booking_ids, OwnerScope::Tenant(tenant))
                    .await?,
                self.existing_identifiers(lookup, RecordKind::Refund, &refund_ids, OwnerScope::Tenant(tenant))
                    .await?,
            )
        };

        let bookings = partition(bookings, &owned_bookings);
        let refunds = partition(refunds, &owned_refunds);
        info!(
            "Partitioned batch for tenant {}: bookings {} new / {} existing / {} repeated, refunds {} new / {} existing / {} repeated",
            tenant,
            bookings.fresh.len(),
            bookings.existing.len(),
            bookings.in_batch_duplicates,
            refunds.fresh.len(),
            refunds.existing.len(),
            refunds.in_batch_duplicates
        );

        Ok(CheckOutcome {
            conflicts,
            bookings,
            refunds,
        })
    }
}

/// Distinct non-blank identifiers in first-seen order.
pub fn distinct_identifiers<R: NormalizedRecord>(rows: &[R]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .map(|row| row.identifier())
        .filter(|id| !id.trim().is_empty() && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// The first occurrence of an identifier decides its side; repeats are counted.
pub fn partition<R: NormalizedRecord>(rows: Vec<R>, existing: &HashSet<String>) -> Partition<R> {
    let mut seen = HashSet::new();
    let mut result = Partition::default();
    for row in rows {
        if !seen.insert(row.identifier().to_string()) {
            result.in_batch_duplicates += 1;
        } else if existing.contains(row.identifier()) {
            result.existing.push(row);
        } else {
            result.fresh.push(row);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    /// In-memory lookup that records how it was called.
    struct FakeLookup {
        stored: Vec<(RecordKind, &'static str, TenantId)>,
        calls: Vec<usize>,
    }

    impl FakeLookup {
        fn new(stored: Vec<(RecordKind, &'static str, TenantId)>) -> Self {
            Self { stored, calls: Vec::new() }
        }
    }

    #[async_trait]
    impl IdentifierLookup for FakeLookup {
        async fn find_identifiers(
            &mut self,
            kind: RecordKind,
            identifiers: &[String],
            scope: OwnerScope,
        ) -> Result<HashSet<String>, IngestionError> {
            self.calls.push(identifiers.len());
            Ok(self
                .stored
                .iter()
                .filter(|(k, _, owner)| {
                    *k == kind
                        && match scope {
                            OwnerScope::Tenant(t) => *owner == t,
                            OwnerScope::OtherThan(t) => *owner != t,
                        }
                })
                .map(|(_, id, _)| id.to_string())
                .filter(|id| identifiers.contains(id))
                .collect())
        }
    }

    fn booking(pnr: &str) -> BookingRecord {
        BookingRecord {
            pnr_ticket_no: pnr.to_string(),
            ..BookingRecord::default()
        }
    }

    fn refund(pnr: &str) -> RefundRecord {
        RefundRecord {
            pnr_no: pnr.to_string(),
            ..RefundRecord::default()
        }
    }

    const MINE: TenantId = TenantId(1);
    const OTHER: TenantId = TenantId(2);

    #[tokio::test]
    async fn conflict_detection_is_independent_of_chunk_size() {
        let bookings: Vec<BookingRecord> = (0..1200).map(|i| booking(&format!("P{i}"))).collect();
        let mut outcomes = Vec::new();

        for chunk_size in [1, 500, 5000] {
            let mut lookup = FakeLookup::new(vec![
                (RecordKind::Booking, "P1199", OTHER),
                (RecordKind::Booking, "P3", MINE),
            ]);
            let outcome = ConflictChecker::new(chunk_size)
                .check(&mut lookup, MINE, WriteMode::Skip, bookings.clone(), Vec::new())
                .await
                .unwrap();
            assert!(lookup.calls.iter().all(|n| *n <= chunk_size));
            outcomes.push(outcome.conflicts);
        }

        assert!(outcomes.iter().all(|c| c.iter().eq(["P1199".to_string()].iter())));
    }

    #[tokio::test]
    async fn partitions_new_existing_and_repeats() {
        let mut lookup = FakeLookup::new(vec![(RecordKind::Booking, "B", MINE), (RecordKind::Refund, "R1", MINE)]);
        let outcome = ConflictChecker::new(2)
            .check(
                &mut lookup,
                MINE,
                WriteMode::Skip,
                vec![booking("A"), booking("B"), booking("A"), booking("C")],
                vec![refund("R1"), refund("R2")],
            )
            .await
            .unwrap();

        assert!(!outcome.has_conflict());
        let fresh: Vec<&str> = outcome.bookings.fresh.iter().map(|b| b.pnr_ticket_no.as_str()).collect();
        assert_eq!(fresh, ["A", "C"]);
        assert_eq!(outcome.bookings.existing.len(), 1);
        assert_eq!(outcome.bookings.in_batch_duplicates, 1);
        assert_eq!(outcome.refunds.fresh[0].pnr_no, "R2");
        assert_eq!(outcome.refunds.existing[0].pnr_no, "R1");
    }

    #[tokio::test]
    async fn identifier_spaces_are_per_record_kind() {
        // A refund PNR owned elsewhere does not clash with an incoming booking.
        let mut lookup = FakeLookup::new(vec![(RecordKind::Refund, "X1", OTHER)]);
        let outcome = ConflictChecker::new(500)
            .check(&mut lookup, MINE, WriteMode::Skip, vec![booking("X1")], Vec::new())
            .await
            .unwrap();
        assert!(!outcome.has_conflict());

        let outcome = ConflictChecker::new(500)
            .check(&mut lookup, MINE, WriteMode::Skip, Vec::new(), vec![refund("X1")])
            .await
            .unwrap();
        assert_eq!(outcome.conflicts.into_iter().collect::<Vec<_>>(), ["X1"]);
    }

    #[tokio::test]
    async fn replace_mode_treats_everything_as_fresh() {
        let mut lookup = FakeLookup::new(vec![(RecordKind::Booking, "A", MINE)]);
        let outcome = ConflictChecker::new(500)
            .check(&mut lookup, MINE, WriteMode::Replace, vec![booking("A"), booking("A")], Vec::new())
            .await
            .unwrap();
        assert_eq!(outcome.bookings.fresh.len(), 1);
        assert!(outcome.bookings.existing.is_empty());
        assert_eq!(outcome.bookings.in_batch_duplicates, 1);
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        assert_eq!(ConflictChecker::new(0).chunk_size(), 1);
    }
}
