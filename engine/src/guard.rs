//! Idempotency guard for migration writes.
//!
//! There is no migration log. A record already present in the cloud store is
//! the proof that it was migrated (or created there independently), so the
//! guard checks existence and then writes with create-if-absent semantics.
//! The store's conditional write settles races between concurrent runs.

use crate::{
    error::{SourceError, WriteError},
    source::{CloudStore, CreateOutcome},
    TreeRecord,
};

/// What the guard did with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// The record was created in the cloud store
    Written,
    /// The existence check found the record; nothing was written
    AlreadyPresent,
    /// The check saw no record but the create-only write lost to another writer
    RaceLost,
    /// The existence check itself failed
    CheckFailed(SourceError),
    /// The write failed
    WriteFailed(WriteError),
}

/// Write `record` to the cloud unless a record with its id already exists.
pub async fn guarded_create<C: CloudStore + ?Sized>(cloud: &C, record: &TreeRecord) -> GuardDecision {
    match cloud.fetch_one(&record.farm_id, &record.id).await {
        Ok(Some(_)) => return GuardDecision::AlreadyPresent,
        Ok(None) => {}
        Err(e) => return GuardDecision::CheckFailed(e),
    }

    match cloud.create_if_absent(record).await {
        Ok(CreateOutcome::Created) => GuardDecision::Written,
        Ok(CreateOutcome::AlreadyExists) => GuardDecision::RaceLost,
        Err(e) => GuardDecision::WriteFailed(e),
    }
}
