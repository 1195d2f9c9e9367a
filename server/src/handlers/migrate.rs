//! Migrate handler - copies mobile-only trees into the cloud store.

use crate::error::{AppError, Result};
use crate::TreeEngine;
use chrono::{DateTime, Utc};
use orchard_engine::{CancellationToken, MigrationOutcome};
use serde::{Deserialize, Serialize};

/// Request body for a migration run.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateRequest {
    /// Ids to migrate. Empty means every id currently only in the mobile store.
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Response for a migration run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateResponse {
    #[serde(flatten)]
    pub outcome: MigrationOutcome,
    pub completed_at: DateTime<Utc>,
}

/// Process a migration request.
///
/// `shutdown` stops the run between ids; unprocessed ids come back in
/// `cancelled`.
pub async fn handle_migrate(
    engine: &TreeEngine,
    farm_id: &str,
    request: MigrateRequest,
    shutdown: &CancellationToken,
) -> Result<MigrateResponse> {
    if request.ids.iter().any(|id| id.trim().is_empty()) {
        return Err(AppError::BadRequest("ids must not be blank".to_string()));
    }

    let ids = if request.ids.is_empty() {
        let report = engine.reconcile(farm_id).await?;
        tracing::debug!(farm_id, pending = report.only_in_mobile.len(), "migrating all pending trees");
        report.only_in_mobile
    } else {
        request.ids
    };

    let outcome = engine.migrate_with_cancel(farm_id, ids, shutdown).await?;

    Ok(MigrateResponse {
        outcome,
        completed_at: Utc::now(),
    })
}
