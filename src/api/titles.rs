use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
};
use std::sync::Arc;

use super::validation::{parse_content_type, validate_limit};
use super::{ApiError, ApiResponse, AppState, ContentTypeQuery, RepairRequest, TitleCounts};
use crate::constants::limits::DEFAULT_REPAIR_LIMIT;
use crate::db::IncompleteTitle;
use crate::domain::ContentType;
use crate::services::RepairReport;

/// `GET /api/titles/count`
pub async fn count_titles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<TitleCounts>>, ApiError> {
    let anime = state.store().count_titles(Some(ContentType::Anime)).await?;
    let manga = state.store().count_titles(Some(ContentType::Manga)).await?;
    Ok(Json(ApiResponse::success(TitleCounts {
        anime,
        manga,
        total: anime + manga,
    })))
}

/// `GET /api/titles/incomplete?contentType=anime`
///
/// Titles left without a detail row by an interrupted upsert.
pub async fn list_incomplete(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContentTypeQuery>,
) -> Result<Json<ApiResponse<Vec<IncompleteTitle>>>, ApiError> {
    let content_type = parse_content_type(query.content_type.as_deref())?;
    let titles = state
        .shared
        .repair_service
        .find_incomplete(content_type)
        .await?;
    Ok(Json(ApiResponse::success(titles)))
}

/// `POST /api/repair`
pub async fn repair(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ApiResponse<RepairReport>>, ApiError> {
    // An empty body means "defaults for everything".
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RepairRequest::default()
    } else {
        serde_json::from_slice::<RepairRequest>(&body)
            .map_err(|e| ApiError::validation(format!("Invalid repair request: {e}")))?
    };

    let source = match request.source {
        Some(source) => source,
        None => state.config().read().await.sync.default_source,
    };
    if state.shared.sources.get(source).is_none() {
        return Err(ApiError::validation(format!(
            "catalog source '{source}' is not configured"
        )));
    }
    let limit = validate_limit(request.limit.unwrap_or(DEFAULT_REPAIR_LIMIT))?;

    let report = state.shared.repair_service.repair(source, limit).await?;
    Ok(Json(ApiResponse::success(report)))
}
