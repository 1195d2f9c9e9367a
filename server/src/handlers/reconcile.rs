//! Reconcile handler - compares the mobile and cloud stores for one farm.

use crate::error::Result;
use crate::TreeEngine;
use chrono::{DateTime, Utc};
use orchard_engine::ReconciliationResult;
use serde::Serialize;

/// Response for a reconciliation run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    #[serde(flatten)]
    pub result: ReconciliationResult,
    /// When both stores were read
    pub generated_at: DateTime<Utc>,
}

/// Reconcile one farm.
pub async fn handle_reconcile(engine: &TreeEngine, farm_id: &str) -> Result<ReconcileResponse> {
    let generated_at = Utc::now();
    let result = engine.reconcile(farm_id).await?;

    Ok(ReconcileResponse {
        result,
        generated_at,
    })
}
