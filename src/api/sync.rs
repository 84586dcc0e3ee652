use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    response::IntoResponse,
};
use std::sync::Arc;

use super::observability::RUN_ID_HEADER;
use super::validation::validate_limit;
use super::{ApiError, ApiResponse, AppState, LimitQuery, SyncRunDto};
use crate::constants::limits::DEFAULT_RUNS_LIMIT;
use crate::services::SyncRequest;

/// `POST /api/sync`
///
/// Runs a sync and answers with the run report itself, not the usual
/// envelope. Aborted and failed runs still answer 200 with `success: false`;
/// only malformed requests are rejected. The run id is echoed in
/// `x-run-id`.
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::validation(e.body_text()))?;
    let report = state.shared.sync_service.run(request).await?;
    Ok(([(RUN_ID_HEADER, report.run_id.clone())], Json(report)))
}

/// `GET /api/sync/runs?limit=N`
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<SyncRunDto>>>, ApiError> {
    let limit = validate_limit(query.limit.unwrap_or(DEFAULT_RUNS_LIMIT))?;
    let runs = state.store().recent_sync_runs(limit).await?;
    Ok(Json(ApiResponse::success(
        runs.into_iter().map(SyncRunDto::from).collect(),
    )))
}
