use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogDoc, SeasonGroup};
use crate::db::{FavoriteEntry, WatchHistoryEntry};
use crate::session::Identity;

#[derive(Debug, Serialize)]
pub struct LoginUrlResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: Identity,
}

#[derive(Debug, Deserialize)]
pub struct WatchRequest {
    pub video_id: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleFavoriteRequest {
    pub video_id: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleFavoriteResponse {
    pub favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct FavoriteDto {
    pub video_id: String,
    pub title: String,
    pub added_at: Option<String>,
}

impl From<FavoriteEntry> for FavoriteDto {
    fn from(entry: FavoriteEntry) -> Self {
        Self {
            video_id: entry.videoid,
            title: entry.title,
            added_at: entry.addedat.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryDto {
    pub video_id: String,
    pub title: String,
    pub watched_at: Option<String>,
}

impl From<WatchHistoryEntry> for HistoryDto {
    fn from(entry: WatchHistoryEntry) -> Self {
        Self {
            video_id: entry.videoid,
            title: entry.title,
            watched_at: entry.watchedat.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SaveProgressRequest {
    pub video_id: String,
    pub position_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub video_id: String,
    pub position_seconds: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub year: Option<String>,
    pub genre: Option<String>,
    #[serde(default)]
    pub subjects: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub docs: Vec<CatalogDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_counts: Option<HashMap<String, usize>>,
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: String,
    pub stream_url: Option<String>,
    pub seasons: Vec<SeasonGroup>,
}
