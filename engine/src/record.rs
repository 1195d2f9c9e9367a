//! Tree records and per-store record sets.

use crate::{
    error::Result,
    value::{fields_from_json, fields_to_json},
    Error, FarmId, FieldName, FieldValue, RecordId, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Which store produced a copy of a record.
///
/// Provenance only. Two copies with different origins and the same id are
/// the same tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOrigin {
    /// The on-device store of the offline mobile client
    Mobile,
    /// The canonical multi-user document store
    Cloud,
}

impl std::fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceOrigin::Mobile => write!(f, "mobile"),
            SourceOrigin::Cloud => write!(f, "cloud"),
        }
    }
}

/// A tree as held by one of the two stores.
///
/// Equality looks at the normalized content only, not at the source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeRecord {
    /// Identifier assigned on the client at creation time
    pub id: RecordId,
    /// Owning farm
    pub farm_id: FarmId,
    /// Flat attribute map (name, variety, health, gps, fruit count, ...)
    pub fields: BTreeMap<FieldName, FieldValue>,
    /// Last modification (milliseconds since epoch)
    pub updated_at: Timestamp,
    /// Store that produced this copy
    pub source_origin: SourceOrigin,
    /// The attribute map exactly as the store returned it, when this record
    /// was read from a store. Migration writes this document, not `fields`.
    #[serde(skip)]
    document: Option<Map<String, Value>>,
}

impl PartialEq for TreeRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.farm_id == other.farm_id
            && self.fields == other.fields
            && self.updated_at == other.updated_at
            && self.source_origin == other.source_origin
    }
}

impl TreeRecord {
    /// Create a record with no fields.
    pub fn new(
        id: impl Into<RecordId>,
        farm_id: impl Into<FarmId>,
        updated_at: Timestamp,
        source_origin: SourceOrigin,
    ) -> Self {
        Self {
            id: id.into(),
            farm_id: farm_id.into(),
            fields: BTreeMap::new(),
            updated_at,
            source_origin,
            document: None,
        }
    }

    /// Builder-style field setter.
    ///
    /// The record no longer matches any stored document afterwards.
    pub fn with_field(mut self, name: impl Into<FieldName>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self.document = None;
        self
    }

    /// The attribute map as read from its store, if any.
    pub fn document(&self) -> Option<&Map<String, Value>> {
        self.document.as_ref()
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// The same record as seen from another store.
    pub fn with_origin(mut self, origin: SourceOrigin) -> Self {
        self.source_origin = origin;
        self
    }
}

/// The loosely typed shape both stores persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTreeRecord {
    pub id: RecordId,
    pub farm_id: FarmId,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl RawTreeRecord {
    /// Normalize into a typed record stamped with the producing store.
    ///
    /// The record keeps this document so it can be written back unchanged.
    pub fn normalize(self, origin: SourceOrigin) -> Result<TreeRecord> {
        let fields = fields_from_json(&self.fields)?;
        Ok(TreeRecord {
            id: self.id,
            farm_id: self.farm_id,
            fields,
            updated_at: self.updated_at,
            source_origin: origin,
            document: Some(self.fields),
        })
    }

    /// The document to persist for `record`.
    ///
    /// A record read from a store yields its original attribute map
    /// untouched; a record built in code is rendered from its typed fields.
    pub fn from_record(record: &TreeRecord) -> Self {
        let fields = match &record.document {
            Some(document) => document.clone(),
            None => match fields_to_json(&record.fields) {
                Value::Object(obj) => obj,
                _ => Map::new(),
            },
        };
        Self {
            id: record.id.clone(),
            farm_id: record.farm_id.clone(),
            fields,
            updated_at: record.updated_at,
        }
    }
}

/// The complete set of records one store holds for one farm.
///
/// Construction enforces that ids are unique and every record belongs to
/// the farm, and stamps each record with the store's origin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    farm_id: FarmId,
    records: BTreeMap<RecordId, TreeRecord>,
}

impl RecordSet {
    pub fn from_records(
        origin: SourceOrigin,
        farm_id: &str,
        records: impl IntoIterator<Item = TreeRecord>,
    ) -> Result<Self> {
        let mut set = BTreeMap::new();
        for mut record in records {
            if record.farm_id != farm_id {
                return Err(Error::ForeignRecord {
                    origin,
                    id: record.id,
                    expected: farm_id.to_string(),
                    found: record.farm_id,
                });
            }
            record.source_origin = origin;
            if set.contains_key(&record.id) {
                return Err(Error::DuplicateRecordId {
                    origin,
                    id: record.id,
                });
            }
            set.insert(record.id.clone(), record);
        }

        Ok(Self {
            farm_id: farm_id.to_string(),
            records: set,
        })
    }

    pub fn farm_id(&self) -> &str {
        &self.farm_id
    }

    pub fn get(&self, id: &str) -> Option<&TreeRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &TreeRecord> {
        self.records.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
