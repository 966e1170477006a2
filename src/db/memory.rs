use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::model::*;
use super::repo::*;

/// Non-durable backend. Useful for tests and for running the server
/// without a database file; state is lost on shutdown.
#[derive(Default)]
pub struct MemoryRepository {
    users: RwLock<HashMap<String, User>>,
    tokens: RwLock<HashMap<String, AccessToken>>,
    favorites: RwLock<HashMap<String, Vec<FavoriteEntry>>>,
    history: RwLock<HashMap<String, Vec<WatchHistoryEntry>>>,
    progress: RwLock<HashMap<(String, String), ProgressEntry>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepo for MemoryRepository {
    async fn get_user(&self, uid: &str) -> DbResult<User> {
        let users = self.users.read().await;
        users
            .get(uid)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("User not found: {}", uid)))
    }

    async fn upsert_user(&self, uid: &str, profile: &UserProfile) -> DbResult<()> {
        let mut users = self.users.write().await;
        let user = users.entry(uid.to_string()).or_insert_with(|| User {
            id: uid.to_string(),
            email: None,
            displayname: None,
            avatarurl: None,
            lastlogin: None,
        });

        if let Some(ref email) = profile.email {
            user.email = Some(email.clone());
        }
        if let Some(ref name) = profile.displayname {
            user.displayname = Some(name.clone());
        }
        if let Some(ref avatar) = profile.avatarurl {
            user.avatarurl = Some(avatar.clone());
        }
        user.lastlogin = Some(Utc::now());

        Ok(())
    }
}

#[async_trait]
impl AccessTokenRepo for MemoryRepository {
    async fn get_token(&self, token: &str) -> DbResult<AccessToken> {
        let tokens = self.tokens.read().await;
        tokens
            .get(token)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("Token not found: {}", token)))
    }

    async fn insert_token(&self, token: &AccessToken) -> DbResult<()> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn delete_token(&self, token: &str) -> DbResult<()> {
        let mut tokens = self.tokens.write().await;
        tokens.remove(token);
        Ok(())
    }
}

#[async_trait]
impl FavoriteRepo for MemoryRepository {
    async fn add_favorite(&self, uid: &str, video_id: &str, title: &str) -> DbResult<()> {
        let mut favorites = self.favorites.write().await;
        let list = favorites.entry(uid.to_string()).or_default();
        if list.iter().any(|f| f.videoid == video_id) {
            return Ok(());
        }
        list.push(FavoriteEntry {
            userid: uid.to_string(),
            videoid: video_id.to_string(),
            title: title.to_string(),
            addedat: Some(Utc::now()),
        });
        Ok(())
    }

    async fn remove_favorite(&self, uid: &str, video_id: &str) -> DbResult<()> {
        let mut favorites = self.favorites.write().await;
        if let Some(list) = favorites.get_mut(uid) {
            list.retain(|f| f.videoid != video_id);
        }
        Ok(())
    }

    async fn list_favorites(&self, uid: &str) -> DbResult<Vec<FavoriteEntry>> {
        let favorites = self.favorites.read().await;
        Ok(favorites.get(uid).cloned().unwrap_or_default())
    }

    async fn has_favorite(&self, uid: &str, video_id: &str) -> DbResult<bool> {
        let favorites = self.favorites.read().await;
        Ok(favorites
            .get(uid)
            .map(|list| list.iter().any(|f| f.videoid == video_id))
            .unwrap_or(false))
    }
}

#[async_trait]
impl HistoryRepo for MemoryRepository {
    async fn append_history(&self, uid: &str, video_id: &str, title: &str) -> DbResult<()> {
        let mut history = self.history.write().await;
        history
            .entry(uid.to_string())
            .or_default()
            .push(WatchHistoryEntry {
                id: uuid::Uuid::new_v4().to_string(),
                userid: uid.to_string(),
                videoid: video_id.to_string(),
                title: title.to_string(),
                watchedat: Some(Utc::now()),
            });
        Ok(())
    }

    async fn list_history(&self, uid: &str, limit: i64) -> DbResult<Vec<WatchHistoryEntry>> {
        if limit <= 0 {
            return Err(DbError::InvalidArgument(format!(
                "history limit must be positive, got {}",
                limit
            )));
        }

        let history = self.history.read().await;
        let entries = match history.get(uid) {
            Some(entries) => entries,
            None => return Ok(Vec::new()),
        };

        // Entries are appended in arrival order, so reverse iteration is
        // newest first even when two writes share a timestamp.
        Ok(entries
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn clear_history(&self, uid: &str) -> DbResult<()> {
        let mut history = self.history.write().await;
        history.remove(uid);
        Ok(())
    }
}

#[async_trait]
impl ProgressRepo for MemoryRepository {
    async fn save_progress(&self, uid: &str, video_id: &str, position: i64) -> DbResult<()> {
        if position < 0 {
            return Err(DbError::InvalidArgument(format!(
                "position_seconds must not be negative, got {}",
                position
            )));
        }

        let mut progress = self.progress.write().await;
        progress.insert(
            (uid.to_string(), video_id.to_string()),
            ProgressEntry {
                userid: uid.to_string(),
                videoid: video_id.to_string(),
                position,
                updatedat: Some(Utc::now()),
            },
        );
        Ok(())
    }

    async fn get_progress(&self, uid: &str, video_id: &str) -> DbResult<i64> {
        let progress = self.progress.read().await;
        Ok(progress
            .get(&(uid.to_string(), video_id.to_string()))
            .map(|p| p.position)
            .unwrap_or(0))
    }
}

impl LibraryStore for MemoryRepository {
    fn close(&self) {}
}
