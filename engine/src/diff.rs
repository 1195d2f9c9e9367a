//! Field-level comparison of paired records.
//!
//! Floating-point values (numbers and both GPS components) compare with an
//! absolute tolerance so that serialization round-trip noise is not reported
//! as a conflict. Strings, booleans, integers and timestamps (to the
//! nanosecond) must be exactly equal. An integer and a float compare as
//! floats; any other pair of different variants never compares equal.
//!
//! Timestamps and origins take no part in the decision: a conflict stays a
//! conflict whichever copy is newer.

use crate::{identity::Resolved, FieldName, FieldValue, TreeRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default absolute tolerance for floating-point fields (about 1cm of latitude).
pub const DEFAULT_FLOAT_EPSILON: f64 = 1e-7;

/// How two copies of a record are compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComparePolicy {
    /// Absolute tolerance for `Number` and `GeoPoint` components
    pub float_epsilon: f64,
    /// Fields that are never compared (store-managed bookkeeping)
    pub ignored_fields: BTreeSet<FieldName>,
}

impl Default for ComparePolicy {
    fn default() -> Self {
        Self {
            float_epsilon: DEFAULT_FLOAT_EPSILON,
            ignored_fields: BTreeSet::new(),
        }
    }
}

impl ComparePolicy {
    pub fn with_float_epsilon(mut self, epsilon: f64) -> Self {
        self.float_epsilon = epsilon;
        self
    }

    pub fn ignore_field(mut self, name: impl Into<FieldName>) -> Self {
        self.ignored_fields.insert(name.into());
        self
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_fields.contains(name)
    }
}

/// Outcome of comparing two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equality {
    Exact,
    /// Equal only within the float tolerance
    WithinTolerance,
    Different,
}

/// Compare two field values under the given tolerance.
pub fn compare_values(a: &FieldValue, b: &FieldValue, epsilon: f64) -> Equality {
    match (a, b) {
        (FieldValue::String(x), FieldValue::String(y)) => exact(x == y),
        (FieldValue::Bool(x), FieldValue::Bool(y)) => exact(x == y),
        (FieldValue::Timestamp(x), FieldValue::Timestamp(y)) => exact(x == y),
        (FieldValue::Integer(x), FieldValue::Integer(y)) => exact(x == y),
        (FieldValue::Number(x), FieldValue::Number(y)) => compare_floats(*x, *y, epsilon),
        (FieldValue::Integer(x), FieldValue::Number(y)) => compare_floats(*x as f64, *y, epsilon),
        (FieldValue::Number(x), FieldValue::Integer(y)) => compare_floats(*x, *y as f64, epsilon),
        (FieldValue::GeoPoint(p), FieldValue::GeoPoint(q)) => {
            match (
                compare_floats(p.lat, q.lat, epsilon),
                compare_floats(p.lng, q.lng, epsilon),
            ) {
                (Equality::Different, _) | (_, Equality::Different) => Equality::Different,
                (Equality::Exact, Equality::Exact) => Equality::Exact,
                _ => Equality::WithinTolerance,
            }
        }
        _ => Equality::Different,
    }
}

fn exact(equal: bool) -> Equality {
    if equal {
        Equality::Exact
    } else {
        Equality::Different
    }
}

fn compare_floats(a: f64, b: f64, epsilon: f64) -> Equality {
    if a == b || (a.is_nan() && b.is_nan()) {
        Equality::Exact
    } else if (a - b).abs() <= epsilon {
        Equality::WithinTolerance
    } else {
        Equality::Different
    }
}

/// A field whose value differs between the two copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDiff {
    pub field: FieldName,
    /// Mobile value, `None` when the field is absent on the mobile copy
    pub mobile: Option<FieldValue>,
    /// Cloud value, `None` when the field is absent on the cloud copy
    pub cloud: Option<FieldValue>,
}

/// Classification of one resolved identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Present in both stores, every field exactly equal
    Identical,
    /// Present in both stores, equal once float tolerance is applied
    Equivalent,
    /// Present in both stores with at least one differing field
    Conflict(Vec<FieldDiff>),
    /// Present only in the mobile store
    OnlyInMobile,
    /// Present only in the cloud store
    OnlyInCloud,
}

impl Classification {
    /// Whether the record lands in the `matched` bucket.
    pub fn is_matched(&self) -> bool {
        matches!(self, Classification::Identical | Classification::Equivalent)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Identical => "identical",
            Classification::Equivalent => "equivalent",
            Classification::Conflict(_) => "conflict",
            Classification::OnlyInMobile => "onlyInMobile",
            Classification::OnlyInCloud => "onlyInCloud",
        }
    }
}

/// Compare every field of two copies of the same record.
///
/// The union of both field-name sets is compared; a field missing on one
/// side is a difference.
pub fn compare_records(
    mobile: &TreeRecord,
    cloud: &TreeRecord,
    policy: &ComparePolicy,
) -> Classification {
    let names: BTreeSet<&FieldName> = mobile.fields.keys().chain(cloud.fields.keys()).collect();

    let mut diffs = Vec::new();
    let mut within_tolerance = false;

    for name in names {
        if policy.is_ignored(name) {
            continue;
        }

        let (m, c) = (mobile.field(name), cloud.field(name));
        let equality = match (m, c) {
            (Some(a), Some(b)) => compare_values(a, b, policy.float_epsilon),
            _ => Equality::Different,
        };

        match equality {
            Equality::Exact => {}
            Equality::WithinTolerance => within_tolerance = true,
            Equality::Different => diffs.push(FieldDiff {
                field: name.clone(),
                mobile: m.cloned(),
                cloud: c.cloned(),
            }),
        }
    }

    if !diffs.is_empty() {
        Classification::Conflict(diffs)
    } else if within_tolerance {
        Classification::Equivalent
    } else {
        Classification::Identical
    }
}

/// Classify a resolved identity.
pub fn classify(resolved: &Resolved<'_>, policy: &ComparePolicy) -> Classification {
    match resolved {
        Resolved::Both { mobile, cloud } => compare_records(mobile, cloud, policy),
        Resolved::MobileOnly(_) => Classification::OnlyInMobile,
        Resolved::CloudOnly(_) => Classification::OnlyInCloud,
    }
}
