//! Reconciliation report types and their builder.

use crate::{
    diff::{Classification, FieldDiff},
    identity::Resolved,
    FarmId, RecordId, SourceOrigin, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A record present in both stores with equal fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedTree {
    pub id: RecordId,
    /// Equal only once float tolerance was applied
    pub within_tolerance: bool,
}

/// A record present in both stores with differing fields.
///
/// Left for an explicit decision by the caller; never resolved here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    pub id: RecordId,
    pub diffs: Vec<FieldDiff>,
    pub mobile_updated_at: Timestamp,
    pub cloud_updated_at: Timestamp,
    /// Which copy was modified last, `None` on a tie. Advisory only.
    pub newer_side: Option<SourceOrigin>,
}

impl ConflictEntry {
    pub fn diff(&self, field: &str) -> Option<&FieldDiff> {
        self.diffs.iter().find(|d| d.field == field)
    }
}

/// Bucket sizes.
///
/// Only [`Summary::from_buckets`] builds one, so every count always equals
/// the length of its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub trees_matched: usize,
    pub trees_with_conflicts: usize,
    /// Cloud-only records
    pub trees_only_in_web: usize,
    /// Mobile-only records
    pub trees_only_in_ios: usize,
    /// Migration candidates, always equal to `trees_only_in_ios`
    pub trees_to_migrate: usize,
    pub total_mobile: usize,
    pub total_cloud: usize,
}

impl Summary {
    pub fn from_buckets(
        matched: &[MatchedTree],
        conflicts: &[ConflictEntry],
        only_in_cloud: &[RecordId],
        only_in_mobile: &[RecordId],
    ) -> Self {
        Self {
            trees_matched: matched.len(),
            trees_with_conflicts: conflicts.len(),
            trees_only_in_web: only_in_cloud.len(),
            trees_only_in_ios: only_in_mobile.len(),
            trees_to_migrate: only_in_mobile.len(),
            total_mobile: matched.len() + conflicts.len() + only_in_mobile.len(),
            total_cloud: matched.len() + conflicts.len() + only_in_cloud.len(),
        }
    }
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub farm_id: FarmId,
    pub matched: Vec<MatchedTree>,
    pub conflicts: Vec<ConflictEntry>,
    pub only_in_cloud: Vec<RecordId>,
    /// Migration candidates
    pub only_in_mobile: Vec<RecordId>,
    pub summary: Summary,
}

impl ReconciliationResult {
    /// Nothing to migrate and nothing to review.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.only_in_mobile.is_empty() && self.only_in_cloud.is_empty()
    }

    pub fn conflict(&self, id: &str) -> Option<&ConflictEntry> {
        self.conflicts.iter().find(|c| c.id == id)
    }

    pub fn is_matched(&self, id: &str) -> bool {
        self.matched.iter().any(|m| m.id == id)
    }
}

/// Accumulates classifications into a [`ReconciliationResult`].
#[derive(Debug, Default)]
pub struct ReportBuilder {
    farm_id: FarmId,
    matched: Vec<MatchedTree>,
    conflicts: Vec<ConflictEntry>,
    only_in_cloud: Vec<RecordId>,
    only_in_mobile: Vec<RecordId>,
}

impl ReportBuilder {
    pub fn new(farm_id: impl Into<FarmId>) -> Self {
        Self {
            farm_id: farm_id.into(),
            ..Default::default()
        }
    }

    /// Place one classified identity in its bucket.
    pub fn record(&mut self, resolved: &Resolved<'_>, classification: Classification) {
        let id = resolved.id().to_string();
        match classification {
            Classification::Identical => self.matched.push(MatchedTree {
                id,
                within_tolerance: false,
            }),
            Classification::Equivalent => self.matched.push(MatchedTree {
                id,
                within_tolerance: true,
            }),
            Classification::Conflict(diffs) => {
                let (mobile_updated_at, cloud_updated_at) = match resolved {
                    Resolved::Both { mobile, cloud } => (mobile.updated_at, cloud.updated_at),
                    Resolved::MobileOnly(r) | Resolved::CloudOnly(r) => (r.updated_at, r.updated_at),
                };
                let newer_side = match mobile_updated_at.cmp(&cloud_updated_at) {
                    Ordering::Greater => Some(SourceOrigin::Mobile),
                    Ordering::Less => Some(SourceOrigin::Cloud),
                    Ordering::Equal => None,
                };
                self.conflicts.push(ConflictEntry {
                    id,
                    diffs,
                    mobile_updated_at,
                    cloud_updated_at,
                    newer_side,
                });
            }
            Classification::OnlyInMobile => self.only_in_mobile.push(id),
            Classification::OnlyInCloud => self.only_in_cloud.push(id),
        }
    }

    pub fn build(mut self) -> ReconciliationResult {
        self.matched.sort_by(|a, b| a.id.cmp(&b.id));
        self.conflicts.sort_by(|a, b| a.id.cmp(&b.id));
        self.only_in_cloud.sort();
        self.only_in_mobile.sort();

        let summary = Summary::from_buckets(
            &self.matched,
            &self.conflicts,
            &self.only_in_cloud,
            &self.only_in_mobile,
        );

        ReconciliationResult {
            farm_id: self.farm_id,
            matched: self.matched,
            conflicts: self.conflicts,
            only_in_cloud: self.only_in_cloud,
            only_in_mobile: self.only_in_mobile,
            summary,
        }
    }
}
