use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};

use super::status_for;
use super::types::*;
use crate::library::Resumable;
use crate::server::AppState;
use crate::session::SessionContext;

/// POST /api/library/watch
pub async fn record_watch(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Json(body): Json<WatchRequest>,
) -> Result<StatusCode, StatusCode> {
    state
        .library
        .record_watch(&ctx, &body.video_id, &body.title)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/library/favorites/toggle
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Json(body): Json<ToggleFavoriteRequest>,
) -> Result<Json<ToggleFavoriteResponse>, StatusCode> {
    let favorite = state
        .library
        .toggle_favorite(&ctx, &body.video_id, &body.title)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(Json(ToggleFavoriteResponse { favorite }))
}

/// GET /api/library/favorites
pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<Vec<FavoriteDto>>, StatusCode> {
    let favorites = state
        .library
        .list_favorites(&ctx)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(Json(favorites.into_iter().map(FavoriteDto::from).collect()))
}

/// GET /api/library/history?limit=
pub async fn list_history(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryDto>>, StatusCode> {
    // The store treats a non-positive limit as a contract violation;
    // query strings are clamped instead of trusted.
    let limit = query.limit.map(|l| l.clamp(1, 100));
    let history = state
        .library
        .list_history(&ctx, limit)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(Json(history.into_iter().map(HistoryDto::from).collect()))
}

/// DELETE /api/library/history
pub async fn clear_history(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<StatusCode, StatusCode> {
    state
        .library
        .clear_history(&ctx)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/library/resume
pub async fn list_resumables(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<Vec<Resumable>>, StatusCode> {
    let resumables = state
        .library
        .compute_resumables(&ctx)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(Json(resumables))
}

/// POST /api/library/progress
pub async fn save_progress(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Json(body): Json<SaveProgressRequest>,
) -> Result<StatusCode, StatusCode> {
    state
        .library
        .save_progress(&ctx, &body.video_id, body.position_seconds)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/library/progress/:video_id
pub async fn get_progress(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(video_id): Path<String>,
) -> Result<Json<ProgressResponse>, StatusCode> {
    let position_seconds = state
        .library
        .get_progress(&ctx, &video_id)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(Json(ProgressResponse {
        video_id,
        position_seconds,
    }))
}

/// GET /api/library/history/export
pub async fn export_history(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Response, StatusCode> {
    let csv = state
        .library
        .export_history_csv(&ctx)
        .await
        .map_err(|e| status_for(&e))?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
        (
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"watch_history.csv\"",
        ),
    ];

    Ok((headers, csv).into_response())
}
