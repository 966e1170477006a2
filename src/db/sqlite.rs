use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::RwLock;
use tracing::{error, info};

use async_trait::async_trait;

use super::model::*;
use super::repo::*;

pub struct SqliteRepository {
    pool: SqlitePool,
    token_cache: Arc<RwLock<HashMap<String, AccessToken>>>,
    progress_cache: Arc<RwLock<HashMap<(String, String), i64>>>,
}

impl SqliteRepository {
    pub async fn new(db_path: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(db_path)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let repo = Self {
            pool,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
            progress_cache: Arc::new(RwLock::new(HashMap::new())),
        };

        repo.init_schema().await?;

        info!("Database initialized at {}", db_path);

        Ok(repo)
    }

    async fn init_schema(&self) -> DbResult<()> {
        let schema = include_str!("schema.sql");
        sqlx::query(schema).execute(&self.pool).await?;
        Ok(())
    }

    pub fn start_background_tasks(self: Arc<Self>) {
        let repo_clone = Arc::clone(&self);
        tokio::spawn(async move {
            repo_clone.token_flush_loop().await;
        });
    }

    async fn token_flush_loop(&self) {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        loop {
            interval.tick().await;
            if let Err(e) = self.flush_token_cache().await {
                error!("Failed to flush token cache: {}", e);
            }
        }
    }

    async fn flush_token_cache(&self) -> DbResult<()> {
        let cache = self.token_cache.read().await;
        for token in cache.values() {
            sqlx::query(
                "INSERT OR REPLACE INTO accesstokens (token, userid, created) VALUES (?, ?, ?)",
            )
            .bind(&token.token)
            .bind(&token.userid)
            .bind(token.created.as_ref().map(|dt| dt.to_rfc3339()))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

fn parse_timestamp(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

#[async_trait]
impl UserRepo for SqliteRepository {
    async fn get_user(&self, uid: &str) -> DbResult<User> {
        let result = sqlx::query_as::<_, (String, Option<String>, Option<String>, Option<String>, Option<String>)>(
            "SELECT id, email, displayname, avatarurl, lastlogin FROM users WHERE id = ?",
        )
        .bind(uid)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => DbError::NotFound(format!("User not found: {}", uid)),
            _ => DbError::Unavailable(e),
        })?;

        Ok(User {
            id: result.0,
            email: result.1,
            displayname: result.2,
            avatarurl: result.3,
            lastlogin: parse_timestamp(result.4),
        })
    }

    async fn upsert_user(&self, uid: &str, profile: &UserProfile) -> DbResult<()> {
        // Merge, never overwrite wholesale: absent profile fields keep
        // their stored value. lastlogin is refreshed on every sign-in.
        sqlx::query(
            "INSERT INTO users (id, email, displayname, avatarurl, lastlogin)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                email = COALESCE(excluded.email, users.email),
                displayname = COALESCE(excluded.displayname, users.displayname),
                avatarurl = COALESCE(excluded.avatarurl, users.avatarurl),
                lastlogin = excluded.lastlogin",
        )
        .bind(uid)
        .bind(&profile.email)
        .bind(&profile.displayname)
        .bind(&profile.avatarurl)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AccessTokenRepo for SqliteRepository {
    async fn get_token(&self, token: &str) -> DbResult<AccessToken> {
        {
            let cache = self.token_cache.read().await;
            if let Some(t) = cache.get(token) {
                return Ok(t.clone());
            }
        }

        let result = sqlx::query_as::<_, (String, String, Option<String>)>(
            "SELECT token, userid, created FROM accesstokens WHERE token = ?",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => DbError::NotFound(format!("Token not found: {}", token)),
            _ => DbError::Unavailable(e),
        })?;

        let access_token = AccessToken {
            token: result.0,
            userid: result.1,
            created: parse_timestamp(result.2),
        };

        let mut cache = self.token_cache.write().await;
        cache.insert(token.to_string(), access_token.clone());

        Ok(access_token)
    }

    async fn insert_token(&self, token: &AccessToken) -> DbResult<()> {
        let mut cache = self.token_cache.write().await;
        cache.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn delete_token(&self, token: &str) -> DbResult<()> {
        {
            let mut cache = self.token_cache.write().await;
            cache.remove(token);
        }

        sqlx::query("DELETE FROM accesstokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl FavoriteRepo for SqliteRepository {
    async fn add_favorite(&self, uid: &str, video_id: &str, title: &str) -> DbResult<()> {
        // OR IGNORE keeps the original row, so addedat is not reset on re-add.
        sqlx::query(
            "INSERT OR IGNORE INTO favorites (userid, videoid, title, addedat) VALUES (?, ?, ?, ?)",
        )
        .bind(uid)
        .bind(video_id)
        .bind(title)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_favorite(&self, uid: &str, video_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM favorites WHERE userid = ? AND videoid = ?")
            .bind(uid)
            .bind(video_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_favorites(&self, uid: &str) -> DbResult<Vec<FavoriteEntry>> {
        let results = sqlx::query_as::<_, (String, String, String, Option<String>)>(
            "SELECT userid, videoid, title, addedat FROM favorites WHERE userid = ? ORDER BY rowid",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        Ok(results
            .into_iter()
            .map(|r| FavoriteEntry {
                userid: r.0,
                videoid: r.1,
                title: r.2,
                addedat: parse_timestamp(r.3),
            })
            .collect())
    }

    async fn has_favorite(&self, uid: &str, video_id: &str) -> DbResult<bool> {
        let result = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM favorites WHERE userid = ? AND videoid = ?",
        )
        .bind(uid)
        .bind(video_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.0 > 0)
    }
}

#[async_trait]
impl HistoryRepo for SqliteRepository {
    async fn append_history(&self, uid: &str, video_id: &str, title: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO watchhistory (id, userid, videoid, title, watchedat) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(uid)
        .bind(video_id)
        .bind(title)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_history(&self, uid: &str, limit: i64) -> DbResult<Vec<WatchHistoryEntry>> {
        if limit <= 0 {
            return Err(DbError::InvalidArgument(format!(
                "history limit must be positive, got {}",
                limit
            )));
        }

        // rowid breaks ties between events written in the same instant.
        let results = sqlx::query_as::<_, (String, String, String, String, Option<String>)>(
            "SELECT id, userid, videoid, title, watchedat FROM watchhistory
             WHERE userid = ?
             ORDER BY watchedat DESC, rowid DESC
             LIMIT ?",
        )
        .bind(uid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(results
            .into_iter()
            .map(|r| WatchHistoryEntry {
                id: r.0,
                userid: r.1,
                videoid: r.2,
                title: r.3,
                watchedat: parse_timestamp(r.4),
            })
            .collect())
    }

    async fn clear_history(&self, uid: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM watchhistory WHERE userid = ?")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressRepo for SqliteRepository {
    async fn save_progress(&self, uid: &str, video_id: &str, position: i64) -> DbResult<()> {
        if position < 0 {
            return Err(DbError::InvalidArgument(format!(
                "position_seconds must not be negative, got {}",
                position
            )));
        }

        {
            let mut cache = self.progress_cache.write().await;
            cache.insert((uid.to_string(), video_id.to_string()), position);
        }

        sqlx::query(
            "INSERT OR REPLACE INTO progress (userid, videoid, position, updatedat) VALUES (?, ?, ?, ?)",
        )
        .bind(uid)
        .bind(video_id)
        .bind(position)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_progress(&self, uid: &str, video_id: &str) -> DbResult<i64> {
        {
            let cache = self.progress_cache.read().await;
            if let Some(&position) = cache.get(&(uid.to_string(), video_id.to_string())) {
                return Ok(position);
            }
        }

        let result = sqlx::query_as::<_, (i64,)>(
            "SELECT position FROM progress WHERE userid = ? AND videoid = ?",
        )
        .bind(uid)
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;

        let position = result.map(|r| r.0).unwrap_or(0);

        let mut cache = self.progress_cache.write().await;
        cache.insert((uid.to_string(), video_id.to_string()), position);

        Ok(position)
    }
}

impl LibraryStore for SqliteRepository {
    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_repo(dir: &tempfile::TempDir) -> SqliteRepository {
        let path = dir.path().join("library.db");
        SqliteRepository::new(path.to_str().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn add_favorite_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        repo.add_favorite("u1", "v42", "Tom and Jerry").await.unwrap();
        repo.add_favorite("u1", "v42", "Tom and Jerry").await.unwrap();

        let favorites = repo.list_favorites("u1").await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].videoid, "v42");
        assert_eq!(favorites[0].title, "Tom and Jerry");
    }

    #[tokio::test]
    async fn remove_absent_favorite_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        repo.remove_favorite("u1", "nope").await.unwrap();
        assert!(repo.list_favorites("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn favorites_are_scoped_by_user() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        repo.add_favorite("u1", "v1", "Popeye").await.unwrap();
        repo.add_favorite("u2", "v2", "Betty Boop").await.unwrap();

        assert_eq!(repo.list_favorites("u1").await.unwrap().len(), 1);
        assert!(repo.has_favorite("u2", "v2").await.unwrap());
        assert!(!repo.has_favorite("u2", "v1").await.unwrap());
    }

    #[tokio::test]
    async fn history_is_append_only_and_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        for _ in 0..3 {
            repo.append_history("u1", "v42", "Tom and Jerry").await.unwrap();
        }
        repo.append_history("u1", "v7", "Felix the Cat").await.unwrap();

        let history = repo.list_history("u1", 20).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].videoid, "v7");

        let ids: std::collections::HashSet<_> = history.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn history_limit_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        for i in 0..5 {
            repo.append_history("u1", &format!("v{}", i), "Cartoon").await.unwrap();
        }

        let history = repo.list_history("u1", 2).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn history_rejects_nonpositive_limit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        assert!(matches!(
            repo.list_history("u1", 0).await,
            Err(DbError::InvalidArgument(_))
        ));
        assert!(matches!(
            repo.list_history("u1", -5).await,
            Err(DbError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn clear_history_deletes_everything_for_the_user() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        repo.append_history("u1", "v1", "Popeye").await.unwrap();
        repo.append_history("u2", "v1", "Popeye").await.unwrap();
        repo.clear_history("u1").await.unwrap();

        assert!(repo.list_history("u1", 20).await.unwrap().is_empty());
        assert_eq!(repo.list_history("u2", 20).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn progress_upsert_is_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        repo.save_progress("u1", "v42", 90).await.unwrap();
        repo.save_progress("u1", "v42", 120).await.unwrap();

        assert_eq!(repo.get_progress("u1", "v42").await.unwrap(), 120);
    }

    #[tokio::test]
    async fn progress_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        assert_eq!(repo.get_progress("u1", "never-seen").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn explicit_reset_to_zero_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        repo.save_progress("u1", "v42", 90).await.unwrap();
        repo.save_progress("u1", "v42", 0).await.unwrap();

        assert_eq!(repo.get_progress("u1", "v42").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn progress_rejects_negative_position() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        assert!(matches!(
            repo.save_progress("u1", "v42", -1).await,
            Err(DbError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn upsert_user_merges_partial_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        repo.upsert_user(
            "u1",
            &UserProfile {
                email: Some("u1@example.com".to_string()),
                displayname: Some("User One".to_string()),
                avatarurl: Some("https://example.com/a.png".to_string()),
            },
        )
        .await
        .unwrap();

        // Later sign-in with a sparse profile keeps earlier fields.
        repo.upsert_user(
            "u1",
            &UserProfile {
                email: Some("u1@example.com".to_string()),
                displayname: None,
                avatarurl: None,
            },
        )
        .await
        .unwrap();

        let user = repo.get_user("u1").await.unwrap();
        assert_eq!(user.displayname.as_deref(), Some("User One"));
        assert_eq!(user.avatarurl.as_deref(), Some("https://example.com/a.png"));
        assert!(user.lastlogin.is_some());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        assert!(matches!(
            repo.get_user("ghost").await,
            Err(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn tokens_round_trip_through_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(&dir).await;

        let token = AccessToken {
            token: "t-1".to_string(),
            userid: "u1".to_string(),
            created: Some(Utc::now()),
        };
        repo.insert_token(&token).await.unwrap();

        let found = repo.get_token("t-1").await.unwrap();
        assert_eq!(found.userid, "u1");

        repo.delete_token("t-1").await.unwrap();
        assert!(matches!(
            repo.get_token("t-1").await,
            Err(DbError::NotFound(_))
        ));
    }
}
