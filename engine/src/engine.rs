//! The reconciliation engine facade.
//!
//! Ties the source adapters, the pure [`Reconciler`] and the
//! [`MigrationExecutor`] together behind the two caller-facing operations:
//! reconcile a farm, and migrate a set of ids for a farm.

use crate::{
    error::Result,
    migration::{MigrationExecutor, MigrationOptions, MigrationOutcome},
    source::{fetch_both, CloudStore, RecordSource},
    ComparePolicy, Error, RecordId, ReconciliationResult, Reconciler,
};
use tokio_util::sync::CancellationToken;

/// Reconciles and migrates tree records between a mobile and a cloud store.
///
/// Holds no per-farm state; one engine can serve any number of farms and
/// concurrent calls.
#[derive(Debug)]
pub struct ReconcileEngine<M, C> {
    mobile: M,
    cloud: C,
    reconciler: Reconciler,
    migration: MigrationOptions,
}

impl<M, C> ReconcileEngine<M, C>
where
    M: RecordSource,
    C: CloudStore,
{
    pub fn new(mobile: M, cloud: C) -> Self {
        Self {
            mobile,
            cloud,
            reconciler: Reconciler::default(),
            migration: MigrationOptions::default(),
        }
    }

    pub fn with_policy(mut self, policy: ComparePolicy) -> Self {
        self.reconciler = Reconciler::new(policy);
        self
    }

    pub fn with_migration_options(mut self, options: MigrationOptions) -> Self {
        self.migration = options;
        self
    }

    pub fn mobile(&self) -> &M {
        &self.mobile
    }

    pub fn cloud(&self) -> &C {
        &self.cloud
    }

    pub fn policy(&self) -> &ComparePolicy {
        self.reconciler.policy()
    }

    /// Compare both stores for `farm_id`.
    ///
    /// Fails if either store cannot be read completely; a one-sided report
    /// is never produced.
    pub async fn reconcile(&self, farm_id: &str) -> Result<ReconciliationResult> {
        validate_farm_id(farm_id)?;

        let (mobile, cloud) = match fetch_both(&self.mobile, &self.cloud, farm_id).await {
            Ok(sets) => sets,
            Err(e) => {
                tracing::error!(farm_id, error = %e, "reconciliation aborted");
                return Err(e);
            }
        };

        let result = self.reconciler.compare(farm_id, &mobile, &cloud);

        tracing::info!(
            farm_id,
            matched = result.summary.trees_matched,
            conflicts = result.summary.trees_with_conflicts,
            only_in_cloud = result.summary.trees_only_in_web,
            only_in_mobile = result.summary.trees_only_in_ios,
            "reconciliation finished"
        );

        Ok(result)
    }

    /// Migrate `ids` from the mobile store into the cloud store.
    pub async fn migrate(
        &self,
        farm_id: &str,
        ids: impl IntoIterator<Item = RecordId>,
    ) -> Result<MigrationOutcome> {
        self.migrate_with_cancel(farm_id, ids, &CancellationToken::new())
            .await
    }

    /// Migrate `ids`, stopping before the next id once `cancel` fires.
    pub async fn migrate_with_cancel(
        &self,
        farm_id: &str,
        ids: impl IntoIterator<Item = RecordId>,
        cancel: &CancellationToken,
    ) -> Result<MigrationOutcome> {
        validate_farm_id(farm_id)?;

        let executor = MigrationExecutor::new(&self.mobile, &self.cloud, self.migration);
        Ok(executor.execute(farm_id, ids, cancel).await)
    }

    /// Reconcile, then migrate every mobile-only record of the fresh report.
    pub async fn migrate_pending(&self, farm_id: &str) -> Result<MigrationOutcome> {
        let report = self.reconcile(farm_id).await?;
        self.migrate(farm_id, report.only_in_mobile).await
    }
}

fn validate_farm_id(farm_id: &str) -> Result<()> {
    if farm_id.trim().is_empty() {
        return Err(Error::InvalidFarmId(farm_id.to_string()));
    }
    Ok(())
}
