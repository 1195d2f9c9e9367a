//! Error types for the Orchard engine.

use crate::{record::SourceOrigin, FarmId, FieldName, RecordId};
use thiserror::Error;

/// Errors that abort a reconciliation or migration run.
///
/// Per-record migration failures are not errors at this level; they are
/// collected into [`crate::MigrationOutcome::failed`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Fetch errors
    #[error("failed to fetch {origin} records: {message}")]
    FetchFailure {
        origin: SourceOrigin,
        message: String,
    },

    // Record set errors
    #[error("duplicate record id in {origin} set: {id}")]
    DuplicateRecordId { origin: SourceOrigin, id: RecordId },

    #[error("record {id} from {origin} belongs to farm '{found}', expected '{expected}'")]
    ForeignRecord {
        origin: SourceOrigin,
        id: RecordId,
        expected: FarmId,
        found: FarmId,
    },

    #[error("unsupported value for field '{field}': {reason}")]
    UnsupportedFieldValue { field: FieldName, reason: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid farm id: {0:?}")]
    InvalidFarmId(FarmId),

    /// Reserved for heuristic matching. Exact-id resolution never raises it.
    #[error("ambiguous identity for record {0}")]
    IdentityAmbiguity(RecordId),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A read failure reported by a record source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A write failure reported by the cloud store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("write failed: {0}")]
    Other(String),
}
