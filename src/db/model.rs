use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub displayname: Option<String>,
    pub avatarurl: Option<String>,
    pub lastlogin: Option<DateTime<Utc>>,
}

/// Profile fields mirrored from the identity provider on sign-in.
/// `None` fields are left untouched by the merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: Option<String>,
    pub displayname: Option<String>,
    pub avatarurl: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessToken {
    pub token: String,
    pub userid: String,
    pub created: Option<DateTime<Utc>>,
}

/// "My list" membership. One row per (userid, videoid), set semantics.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FavoriteEntry {
    pub userid: String,
    pub videoid: String,
    pub title: String,
    pub addedat: Option<DateTime<Utc>>,
}

/// One playback event. History is an append log, so the same video
/// may appear any number of times.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WatchHistoryEntry {
    pub id: String,
    pub userid: String,
    pub videoid: String,
    pub title: String,
    pub watchedat: Option<DateTime<Utc>>,
}

/// Resume position for one (userid, videoid). Upsert, last write wins.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProgressEntry {
    pub userid: String,
    pub videoid: String,
    pub position: i64,
    pub updatedat: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type DbResult<T> = Result<T, DbError>;
