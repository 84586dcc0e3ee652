use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReadyResponse {
    pub ready: bool,
    pub database: bool,
    pub sources: Vec<String>,
    pub uptime_seconds: u64,
}

/// `GET /api/system/health/live`
///
/// Lightweight liveness probe to indicate the API process is running.
pub async fn health_live() -> impl IntoResponse {
    Json(ApiResponse::success(HealthLiveResponse { status: "alive" }))
}

/// `GET /api/system/health/ready`
///
/// Readiness probe: the database answers and at least one catalog source is
/// configured.
pub async fn health_ready(State(state): State<Arc<AppState>>) -> Response {
    let database = state.store().ping().await.is_ok();
    let sources: Vec<String> = state
        .shared
        .sources
        .kinds()
        .iter()
        .map(|k| k.as_str().to_string())
        .collect();

    let ready = database && !sources.is_empty();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::success(HealthReadyResponse {
            ready,
            database,
            sources,
            uptime_seconds: state.start_time.elapsed().as_secs(),
        })),
    )
        .into_response()
}
