//! Record source adapters.
//!
//! The engine reads each store through [`RecordSource`] and writes to the
//! cloud through [`CloudStore`]. Implementations own their transport; the
//! engine only requires that a fetch either returns the complete set for a
//! farm or fails.

use crate::{
    error::{Result, SourceError, WriteError},
    Error, RecordSet, SourceOrigin, TreeRecord,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Read access to one store.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Every tree record the store holds for `farm_id`.
    ///
    /// Must not return a truncated set. A store that cannot read everything
    /// returns an error instead.
    async fn fetch_farm(&self, farm_id: &str) -> std::result::Result<Vec<TreeRecord>, SourceError>;

    /// A single record, or `None` when the store does not hold it.
    async fn fetch_one(
        &self,
        farm_id: &str,
        id: &str,
    ) -> std::result::Result<Option<TreeRecord>, SourceError>;
}

/// Result of a create-only write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A record with this id was already present; nothing was written.
    AlreadyExists,
}

/// The canonical store. Writes are create-if-absent only.
#[async_trait]
pub trait CloudStore: RecordSource {
    /// Write `record` unless a record with the same farm and id exists.
    ///
    /// Must be atomic per record: concurrent calls for the same id yield at
    /// most one [`CreateOutcome::Created`].
    async fn create_if_absent(
        &self,
        record: &TreeRecord,
    ) -> std::result::Result<CreateOutcome, WriteError>;
}

#[async_trait]
impl<T: RecordSource + ?Sized> RecordSource for Arc<T> {
    async fn fetch_farm(&self, farm_id: &str) -> std::result::Result<Vec<TreeRecord>, SourceError> {
        (**self).fetch_farm(farm_id).await
    }

    async fn fetch_one(
        &self,
        farm_id: &str,
        id: &str,
    ) -> std::result::Result<Option<TreeRecord>, SourceError> {
        (**self).fetch_one(farm_id, id).await
    }
}

#[async_trait]
impl<T: CloudStore + ?Sized> CloudStore for Arc<T> {
    async fn create_if_absent(
        &self,
        record: &TreeRecord,
    ) -> std::result::Result<CreateOutcome, WriteError> {
        (**self).create_if_absent(record).await
    }
}

async fn fetch_side<S: RecordSource + ?Sized>(
    source: &S,
    origin: SourceOrigin,
    farm_id: &str,
) -> Result<RecordSet> {
    let records = source
        .fetch_farm(farm_id)
        .await
        .map_err(|e| Error::FetchFailure {
            origin,
            message: e.message,
        })?;

    tracing::debug!(%origin, farm_id, count = records.len(), "fetched record set");
    RecordSet::from_records(origin, farm_id, records)
}

/// Fetch both stores concurrently.
///
/// Fails closed: if either side fails, no sets are returned.
pub async fn fetch_both<M, C>(mobile: &M, cloud: &C, farm_id: &str) -> Result<(RecordSet, RecordSet)>
where
    M: RecordSource + ?Sized,
    C: RecordSource + ?Sized,
{
    futures::try_join!(
        fetch_side(mobile, SourceOrigin::Mobile, farm_id),
        fetch_side(cloud, SourceOrigin::Cloud, farm_id),
    )
}

/// One page of a paginated read.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<TreeRecord>,
    /// Cursor for the next page, `None` on the last page
    pub next_cursor: Option<String>,
}

/// Walk a paginated read to exhaustion.
///
/// Any page error fails the whole read, so a source built on this never
/// reports a partial set as complete. A repeated cursor is treated as an
/// error rather than looping forever.
pub async fn collect_pages<F, Fut>(mut fetch_page: F) -> std::result::Result<Vec<TreeRecord>, SourceError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = std::result::Result<Page, SourceError>>,
{
    let mut records = Vec::new();
    let mut seen_cursors: HashSet<String> = HashSet::new();
    let mut cursor = None;

    loop {
        let page = fetch_page(cursor.take()).await?;
        records.extend(page.records);

        match page.next_cursor {
            Some(next) => {
                if !seen_cursors.insert(next.clone()) {
                    return Err(SourceError::new(format!(
                        "pagination cursor repeated: {}",
                        next
                    )));
                }
                cursor = Some(next);
            }
            None => break,
        }
    }

    Ok(records)
}
