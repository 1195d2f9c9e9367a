//! Tree record stores backed by the `mobile_trees` and `cloud_trees` tables.
//!
//! Both tables share one row shape. Reads are keyset-paginated by tree id and
//! fail as a whole if any page fails. Cloud writes are insert-only: a
//! conflicting `(farm_id, tree_id)` leaves the existing row untouched, and a
//! record read from `mobile_trees` is inserted with its `fields` document
//! exactly as stored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchard_engine::{
    source::{collect_pages, Page},
    CloudStore, CreateOutcome, RawTreeRecord, RecordSource, SourceError, SourceOrigin,
    TreeRecord, WriteError,
};
use sqlx::{PgPool, Row};

/// Which table a store reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeTable {
    Mobile,
    Cloud,
}

impl TreeTable {
    fn name(self) -> &'static str {
        match self {
            TreeTable::Mobile => "mobile_trees",
            TreeTable::Cloud => "cloud_trees",
        }
    }

    fn origin(self) -> SourceOrigin {
        match self {
            TreeTable::Mobile => SourceOrigin::Mobile,
            TreeTable::Cloud => SourceOrigin::Cloud,
        }
    }
}

/// A stored tree row from the database.
#[derive(Debug)]
pub struct StoredTree {
    pub farm_id: String,
    pub tree_id: String,
    pub fields: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredTree {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredTree {
            farm_id: row.try_get("farm_id")?,
            tree_id: row.try_get("tree_id")?,
            fields: row.try_get("fields")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredTree {
    /// Convert a database row to an engine record.
    pub fn to_record(&self, origin: SourceOrigin) -> Result<TreeRecord, SourceError> {
        let fields = match &self.fields {
            serde_json::Value::Object(map) => map.clone(),
            other => {
                return Err(SourceError::new(format!(
                    "tree {} has non-object fields: {}",
                    self.tree_id, other
                )))
            }
        };

        RawTreeRecord {
            id: self.tree_id.clone(),
            farm_id: self.farm_id.clone(),
            fields,
            updated_at: to_millis(self.updated_at),
        }
        .normalize(origin)
        .map_err(|e| SourceError::new(format!("tree {}: {}", self.tree_id, e)))
    }
}

fn to_millis(ts: DateTime<Utc>) -> u64 {
    u64::try_from(ts.timestamp_millis()).unwrap_or(0)
}

fn from_millis(millis: u64) -> Option<DateTime<Utc>> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Queries shared by both tables.
#[derive(Debug, Clone)]
struct TreeQueries {
    pool: PgPool,
    table: TreeTable,
    page_size: i64,
}

impl TreeQueries {
    async fn fetch_page(&self, farm_id: &str, after: Option<String>) -> Result<Page, SourceError> {
        let sql = format!(
            r#"
            SELECT farm_id, tree_id, fields, updated_at
            FROM {}
            WHERE farm_id = $1 AND ($2::text IS NULL OR tree_id > $2)
            ORDER BY tree_id
            LIMIT $3
            "#,
            self.table.name()
        );

        let rows = sqlx::query_as::<_, StoredTree>(&sql)
            .bind(farm_id)
            .bind(after)
            .bind(self.page_size)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.read_error(e))?;

        let next_cursor = if rows.len() as i64 == self.page_size {
            rows.last().map(|row| row.tree_id.clone())
        } else {
            None
        };

        let records = rows
            .iter()
            .map(|row| row.to_record(self.table.origin()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            records,
            next_cursor,
        })
    }

    async fn fetch_farm(&self, farm_id: &str) -> Result<Vec<TreeRecord>, SourceError> {
        collect_pages(move |cursor| self.fetch_page(farm_id, cursor)).await
    }

    async fn fetch_one(&self, farm_id: &str, id: &str) -> Result<Option<TreeRecord>, SourceError> {
        let sql = format!(
            r#"
            SELECT farm_id, tree_id, fields, updated_at
            FROM {}
            WHERE farm_id = $1 AND tree_id = $2
            "#,
            self.table.name()
        );

        let row = sqlx::query_as::<_, StoredTree>(&sql)
            .bind(farm_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.read_error(e))?;

        row.map(|r| r.to_record(self.table.origin())).transpose()
    }

    fn read_error(&self, err: sqlx::Error) -> SourceError {
        tracing::warn!(table = self.table.name(), error = %err, "tree query failed");
        SourceError::new(format!("{} query failed: {}", self.table.name(), err))
    }
}

/// The mobile side: tree records uploaded from devices.
#[derive(Debug, Clone)]
pub struct PgMobileSource {
    queries: TreeQueries,
}

impl PgMobileSource {
    pub fn new(pool: PgPool, page_size: i64) -> Self {
        Self {
            queries: TreeQueries {
                pool,
                table: TreeTable::Mobile,
                page_size,
            },
        }
    }
}

#[async_trait]
impl RecordSource for PgMobileSource {
    async fn fetch_farm(&self, farm_id: &str) -> Result<Vec<TreeRecord>, SourceError> {
        self.queries.fetch_farm(farm_id).await
    }

    async fn fetch_one(&self, farm_id: &str, id: &str) -> Result<Option<TreeRecord>, SourceError> {
        self.queries.fetch_one(farm_id, id).await
    }
}

/// The canonical cloud side.
#[derive(Debug, Clone)]
pub struct PgCloudStore {
    queries: TreeQueries,
}

impl PgCloudStore {
    pub fn new(pool: PgPool, page_size: i64) -> Self {
        Self {
            queries: TreeQueries {
                pool,
                table: TreeTable::Cloud,
                page_size,
            },
        }
    }
}

#[async_trait]
impl RecordSource for PgCloudStore {
    async fn fetch_farm(&self, farm_id: &str) -> Result<Vec<TreeRecord>, SourceError> {
        self.queries.fetch_farm(farm_id).await
    }

    async fn fetch_one(&self, farm_id: &str, id: &str) -> Result<Option<TreeRecord>, SourceError> {
        self.queries.fetch_one(farm_id, id).await
    }
}

#[async_trait]
impl CloudStore for PgCloudStore {
    async fn create_if_absent(&self, record: &TreeRecord) -> Result<CreateOutcome, WriteError> {
        let raw = RawTreeRecord::from_record(record);
        let updated_at = from_millis(record.updated_at).ok_or_else(|| {
            WriteError::Other(format!(
                "tree {} has out-of-range updatedAt {}",
                record.id, record.updated_at
            ))
        })?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO cloud_trees (farm_id, tree_id, fields, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (farm_id, tree_id) DO NOTHING
            RETURNING tree_id
            "#,
        )
        .bind(&raw.farm_id)
        .bind(&raw.id)
        .bind(serde_json::Value::Object(raw.fields))
        .bind(updated_at)
        .fetch_optional(&self.queries.pool)
        .await
        .map_err(write_error)?;

        Ok(match inserted {
            Some(_) => CreateOutcome::Created,
            None => CreateOutcome::AlreadyExists,
        })
    }
}

/// Map a database failure onto the engine's write error categories.
fn write_error(err: sqlx::Error) -> WriteError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("42501") => WriteError::PermissionDenied(db.message().to_string()),
            Some("53100") => WriteError::QuotaExceeded(db.message().to_string()),
            // serialization failure, deadlock, too many connections, admin shutdown
            Some("40001") | Some("40P01") | Some("53300") | Some("57P01") => {
                WriteError::Transient(db.message().to_string())
            }
            _ => WriteError::Other(err.to_string()),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            WriteError::Transient(err.to_string())
        }
        _ => WriteError::Other(err.to_string()),
    }
}
