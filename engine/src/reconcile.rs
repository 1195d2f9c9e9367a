//! Pure reconciliation of two record sets.
//!
//! # Algorithm
//!
//! 1. Pair records by exact id ([`crate::identity::resolve`])
//! 2. Classify every pair or singleton ([`crate::diff::classify`])
//! 3. Aggregate into buckets and derive the summary ([`ReportBuilder`])
//!
//! No IO and no mutable state beyond the builder: the same two sets and
//! policy always produce the same result.

use crate::{
    diff::{classify, ComparePolicy},
    identity::resolve,
    RecordSet, ReconciliationResult, ReportBuilder,
};

/// Compares a mobile and a cloud record set for one farm.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    policy: ComparePolicy,
}

impl Reconciler {
    pub fn new(policy: ComparePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ComparePolicy {
        &self.policy
    }

    /// Classify every record of both sets.
    pub fn compare(
        &self,
        farm_id: &str,
        mobile: &RecordSet,
        cloud: &RecordSet,
    ) -> ReconciliationResult {
        let mut builder = ReportBuilder::new(farm_id);
        for resolved in resolve(mobile, cloud) {
            let classification = classify(&resolved, &self.policy);
            tracing::trace!(id = resolved.id(), class = classification.label(), "classified");
            builder.record(&resolved, classification);
        }
        builder.build()
    }
}
