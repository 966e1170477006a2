use async_trait::async_trait;

use super::model::*;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, uid: &str) -> DbResult<User>;
    /// Merge the non-null fields of `profile` into the stored record and
    /// refresh `lastlogin`. Creates the record on first sign-in.
    async fn upsert_user(&self, uid: &str, profile: &UserProfile) -> DbResult<()>;
}

#[async_trait]
pub trait AccessTokenRepo: Send + Sync {
    async fn get_token(&self, token: &str) -> DbResult<AccessToken>;
    async fn insert_token(&self, token: &AccessToken) -> DbResult<()>;
    async fn delete_token(&self, token: &str) -> DbResult<()>;
}

#[async_trait]
pub trait FavoriteRepo: Send + Sync {
    /// Idempotent: re-adding an existing pair is a no-op and does not
    /// reset `addedat`.
    async fn add_favorite(&self, uid: &str, video_id: &str, title: &str) -> DbResult<()>;
    /// Idempotent: removing an absent pair is a no-op, not an error.
    async fn remove_favorite(&self, uid: &str, video_id: &str) -> DbResult<()>;
    /// Order is stable across repeated reads but otherwise unspecified.
    async fn list_favorites(&self, uid: &str) -> DbResult<Vec<FavoriteEntry>>;
    async fn has_favorite(&self, uid: &str, video_id: &str) -> DbResult<bool>;
}

#[async_trait]
pub trait HistoryRepo: Send + Sync {
    /// Always inserts a fresh entry; never deduplicates. `watchedat` is
    /// assigned by the store at write time.
    async fn append_history(&self, uid: &str, video_id: &str, title: &str) -> DbResult<()>;
    /// Newest first, at most `limit` entries. `limit <= 0` is
    /// `InvalidArgument`.
    async fn list_history(&self, uid: &str, limit: i64) -> DbResult<Vec<WatchHistoryEntry>>;
    async fn clear_history(&self, uid: &str) -> DbResult<()>;
}

#[async_trait]
pub trait ProgressRepo: Send + Sync {
    /// Unconditional upsert, last write wins. Negative positions are
    /// `InvalidArgument`.
    async fn save_progress(&self, uid: &str, video_id: &str, position: i64) -> DbResult<()>;
    /// Returns 0 when no entry exists; "no progress" and "position 0"
    /// are indistinguishable.
    async fn get_progress(&self, uid: &str, video_id: &str) -> DbResult<i64>;
}

pub trait LibraryStore:
    UserRepo + AccessTokenRepo + FavoriteRepo + HistoryRepo + ProgressRepo + Send + Sync
{
    fn close(&self);
}
