//! Migration of mobile-only records into the cloud store.
//!
//! Each candidate id is handled independently:
//!
//! 1. Load the mobile copy
//! 2. Check cloud existence and write with create-if-absent ([`guarded_create`])
//! 3. Record the id as migrated, skipped or failed
//!
//! One failing id never aborts the batch. The cloud store is never
//! overwritten, and a record is either fully written or not at all, so a
//! cancelled or partially failed batch can simply be reconciled and retried.

use crate::{
    error::WriteError,
    guard::{guarded_create, GuardDecision},
    source::{CloudStore, RecordSource},
    FarmId, RecordId,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

/// Default number of ids migrated concurrently.
pub const DEFAULT_MIGRATION_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MigrationOptions {
    /// Maximum ids in flight at once (values below 1 are treated as 1)
    pub concurrency: usize,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_MIGRATION_CONCURRENCY,
        }
    }
}

/// Why an id was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// The existence check found the record in the cloud
    AlreadyInCloud,
    /// Another writer created the record between the check and the write
    RaceLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    pub id: RecordId,
    pub reason: SkipReason,
}

/// Category of a per-record failure, for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// The mobile store does not hold the id
    NotInMobile,
    /// The mobile copy belongs to another farm
    ForeignFarm,
    /// Reading the mobile copy or checking the cloud failed
    ReadFailed,
    PermissionDenied,
    Transient,
    QuotaExceeded,
    Other,
}

impl From<&WriteError> for FailureKind {
    fn from(err: &WriteError) -> Self {
        match err {
            WriteError::PermissionDenied(_) => FailureKind::PermissionDenied,
            WriteError::Transient(_) => FailureKind::Transient,
            WriteError::QuotaExceeded(_) => FailureKind::QuotaExceeded,
            WriteError::Other(_) => FailureKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFailure {
    pub id: RecordId,
    pub kind: FailureKind,
    pub error: String,
}

/// Result of one migration pass.
///
/// `attempted` is partitioned by `migrated`, `skipped`, `failed` and
/// `cancelled`. Every list is in id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub farm_id: FarmId,
    pub attempted: Vec<RecordId>,
    pub migrated: Vec<RecordId>,
    pub skipped: Vec<SkippedRecord>,
    pub failed: Vec<MigrationFailure>,
    /// Ids never processed because the run was cancelled
    pub cancelled: Vec<RecordId>,
}

impl MigrationOutcome {
    fn new(farm_id: &str, attempted: Vec<RecordId>) -> Self {
        Self {
            farm_id: farm_id.to_string(),
            attempted,
            migrated: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
        }
    }

    /// Some ids failed; the rest of the batch still completed.
    pub fn is_partial_failure(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Ids worth retrying: failures and cancellations.
    pub fn retryable_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<_> = self
            .failed
            .iter()
            .filter(|f| f.kind != FailureKind::NotInMobile && f.kind != FailureKind::ForeignFarm)
            .map(|f| f.id.clone())
            .chain(self.cancelled.iter().cloned())
            .collect();
        ids.sort();
        ids
    }

    pub fn skipped_ids(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.id.as_str()).collect()
    }

    fn push(&mut self, id: RecordId, result: IdResult) {
        match result {
            IdResult::Migrated => self.migrated.push(id),
            IdResult::Skipped(reason) => self.skipped.push(SkippedRecord { id, reason }),
            IdResult::Failed(kind, error) => self.failed.push(MigrationFailure { id, kind, error }),
            IdResult::Cancelled => self.cancelled.push(id),
        }
    }

    fn sort(&mut self) {
        self.migrated.sort();
        self.skipped.sort_by(|a, b| a.id.cmp(&b.id));
        self.failed.sort_by(|a, b| a.id.cmp(&b.id));
        self.cancelled.sort();
    }
}

#[derive(Debug)]
enum IdResult {
    Migrated,
    Skipped(SkipReason),
    Failed(FailureKind, String),
    Cancelled,
}

/// Copies mobile-only records into the cloud store.
#[derive(Debug)]
pub struct MigrationExecutor<'a, M: ?Sized, C: ?Sized> {
    mobile: &'a M,
    cloud: &'a C,
    options: MigrationOptions,
}

impl<'a, M, C> MigrationExecutor<'a, M, C>
where
    M: RecordSource + ?Sized,
    C: CloudStore + ?Sized,
{
    pub fn new(mobile: &'a M, cloud: &'a C, options: MigrationOptions) -> Self {
        Self {
            mobile,
            cloud,
            options,
        }
    }

    /// Migrate `ids` of `farm_id`.
    ///
    /// Duplicate ids are collapsed. Cancellation is observed before each id;
    /// ids already in flight finish their write.
    pub async fn execute(
        &self,
        farm_id: &str,
        ids: impl IntoIterator<Item = RecordId>,
        cancel: &CancellationToken,
    ) -> MigrationOutcome {
        let attempted: Vec<RecordId> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut outcome = MigrationOutcome::new(farm_id, attempted.clone());

        let results: Vec<(RecordId, IdResult)> = stream::iter(attempted)
            .map(move |id| async move {
                let result = self.migrate_one(farm_id, &id, cancel).await;
                (id, result)
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        for (id, result) in results {
            outcome.push(id, result);
        }
        outcome.sort();

        tracing::info!(
            farm_id,
            attempted = outcome.attempted.len(),
            migrated = outcome.migrated.len(),
            skipped = outcome.skipped.len(),
            failed = outcome.failed.len(),
            cancelled = outcome.cancelled.len(),
            "migration pass finished"
        );

        outcome
    }

    async fn migrate_one(&self, farm_id: &str, id: &str, cancel: &CancellationToken) -> IdResult {
        if cancel.is_cancelled() {
            return IdResult::Cancelled;
        }

        let record = match self.mobile.fetch_one(farm_id, id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return IdResult::Failed(
                    FailureKind::NotInMobile,
                    format!("record {} not found in mobile store", id),
                )
            }
            Err(e) => {
                tracing::warn!(farm_id, id, error = %e, "mobile read failed");
                return IdResult::Failed(FailureKind::ReadFailed, e.to_string());
            }
        };

        if record.farm_id != farm_id {
            return IdResult::Failed(
                FailureKind::ForeignFarm,
                format!("record {} belongs to farm {}", id, record.farm_id),
            );
        }

        match guarded_create(self.cloud, &record).await {
            GuardDecision::Written => {
                tracing::debug!(farm_id, id, "migrated record");
                IdResult::Migrated
            }
            GuardDecision::AlreadyPresent => IdResult::Skipped(SkipReason::AlreadyInCloud),
            GuardDecision::RaceLost => {
                tracing::debug!(farm_id, id, "lost create race, skipping");
                IdResult::Skipped(SkipReason::RaceLost)
            }
            GuardDecision::CheckFailed(e) => {
                tracing::warn!(farm_id, id, error = %e, "cloud existence check failed");
                IdResult::Failed(FailureKind::ReadFailed, e.to_string())
            }
            GuardDecision::WriteFailed(e) => {
                tracing::warn!(farm_id, id, error = %e, "cloud write failed");
                IdResult::Failed(FailureKind::from(&e), e.to_string())
            }
        }
    }
}
