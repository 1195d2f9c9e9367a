//! In-memory record store.
//!
//! Implements both [`RecordSource`] and [`CloudStore`] so it can stand in
//! for either side. Create-if-absent is atomic under the write lock, which
//! gives the same same-id race semantics a conditional document write does.
//! Failure injection hooks make the fail-closed and partial-failure paths
//! reachable from tests.

use crate::{
    error::{SourceError, WriteError},
    source::{CloudStore, CreateOutcome, RecordSource},
    FarmId, RecordId, TreeRecord,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<(FarmId, RecordId), TreeRecord>>,
    fetch_failure: Mutex<Option<SourceError>>,
    write_failures: Mutex<HashMap<RecordId, WriteError>>,
    /// Records another writer lands right after our existence check
    pending_races: Mutex<HashMap<RecordId, TreeRecord>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = TreeRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace a record directly, bypassing create-only semantics.
    pub fn insert(&self, record: TreeRecord) {
        self.records
            .write()
            .insert((record.farm_id.clone(), record.id.clone()), record);
    }

    pub fn get(&self, farm_id: &str, id: &str) -> Option<TreeRecord> {
        self.records
            .read()
            .get(&(farm_id.to_string(), id.to_string()))
            .cloned()
    }

    /// All records of a farm in id order.
    pub fn records(&self, farm_id: &str) -> Vec<TreeRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.farm_id == farm_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of records created through [`CloudStore::create_if_absent`].
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every read fail until [`MemoryStore::clear_fetch_failure`].
    pub fn fail_fetches_with(&self, message: impl Into<String>) {
        *self.fetch_failure.lock() = Some(SourceError::new(message));
    }

    pub fn clear_fetch_failure(&self) {
        *self.fetch_failure.lock() = None;
    }

    /// Make writes of `id` fail until [`MemoryStore::clear_write_failures`].
    pub fn fail_writes_for(&self, id: impl Into<RecordId>, error: WriteError) {
        self.write_failures.lock().insert(id.into(), error);
    }

    pub fn clear_write_failures(&self) {
        self.write_failures.lock().clear();
    }

    /// Simulate a concurrent writer: the next existence check for the
    /// record's id reports it absent, then `record` appears in the store.
    pub fn race_on_check(&self, record: TreeRecord) {
        self.pending_races.lock().insert(record.id.clone(), record);
    }

    fn check_fetch(&self) -> Result<(), SourceError> {
        match self.fetch_failure.lock().as_ref() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordSource for MemoryStore {
    async fn fetch_farm(&self, farm_id: &str) -> Result<Vec<TreeRecord>, SourceError> {
        self.check_fetch()?;
        Ok(self.records(farm_id))
    }

    async fn fetch_one(&self, farm_id: &str, id: &str) -> Result<Option<TreeRecord>, SourceError> {
        self.check_fetch()?;
        let found = self.get(farm_id, id);

        let raced = self.pending_races.lock().remove(id);
        if let Some(record) = raced {
            if found.is_none() {
                self.insert(record);
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl CloudStore for MemoryStore {
    async fn create_if_absent(&self, record: &TreeRecord) -> Result<CreateOutcome, WriteError> {
        if let Some(err) = self.write_failures.lock().get(&record.id) {
            return Err(err.clone());
        }

        let key = (record.farm_id.clone(), record.id.clone());
        let mut records = self.records.write();
        if records.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        records.insert(key, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(CreateOutcome::Created)
    }
}
