use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::error;

use super::types::*;
use crate::catalog::{client::count_subjects, group_by_season};
use crate::server::AppState;

/// GET /api/catalog/search?q=&year=&genre=&subjects=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, StatusCode> {
    let docs = state
        .catalog
        .search(
            params.q.as_deref(),
            params.year.as_deref(),
            params.genre.as_deref(),
        )
        .await
        .map_err(|e| {
            error!("Catalog search failed: {}", e);
            StatusCode::BAD_GATEWAY
        })?;

    let subject_counts = params.subjects.then(|| count_subjects(&docs));

    Ok(Json(SearchResults {
        docs,
        subject_counts,
    }))
}

/// GET /api/catalog/item/:id
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ItemResponse>, StatusCode> {
    let meta = state.catalog.metadata(&id).await.map_err(|e| {
        error!(item = %id, "Catalog metadata fetch failed: {}", e);
        StatusCode::BAD_GATEWAY
    })?;

    let episodes = state.catalog.episodes(&id, &meta);
    let seasons = group_by_season(episodes);

    Ok(Json(ItemResponse {
        title: meta.metadata.title.clone().unwrap_or_else(|| id.clone()),
        description: meta.metadata.description.clone(),
        thumbnail_url: state.catalog.thumbnail_url(&id, &meta),
        stream_url: state.catalog.stream_url(&id, &meta),
        seasons,
        id,
    }))
}
