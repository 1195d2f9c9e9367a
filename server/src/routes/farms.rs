//! Farm reconciliation and migration routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_migrate, handle_reconcile, MigrateRequest, MigrateResponse, ReconcileResponse,
};
use crate::AppState;

/// Create farm routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/farms/{farm_id}/reconciliation", get(reconcile_handler))
        .route("/farms/{farm_id}/migrations", post(migrate_handler))
}

/// GET /farms/{farm_id}/reconciliation - Compare both stores.
async fn reconcile_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(farm_id): Path<String>,
) -> Result<Json<ReconcileResponse>> {
    tracing::debug!(farm_id = %farm_id, anonymous = auth.anonymous, "reconcile requested");
    let response = handle_reconcile(&state.engine, &farm_id).await?;
    Ok(Json(response))
}

/// POST /farms/{farm_id}/migrations - Copy mobile-only trees to the cloud.
async fn migrate_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(farm_id): Path<String>,
    Json(request): Json<MigrateRequest>,
) -> Result<Json<MigrateResponse>> {
    tracing::debug!(
        farm_id = %farm_id,
        anonymous = auth.anonymous,
        ids = request.ids.len(),
        "migration requested"
    );
    let response = handle_migrate(&state.engine, &farm_id, request, &state.shutdown).await?;
    Ok(Json(response))
}
