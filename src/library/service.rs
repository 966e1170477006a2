use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use super::export;
use crate::db::{DbError, FavoriteEntry, LibraryStore, UserProfile, WatchHistoryEntry};
use crate::session::{Identity, SessionContext};

/// Observed default page size for history reads.
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not signed in")]
    Unauthenticated,
    #[error(transparent)]
    Store(#[from] DbError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A history entry whose last saved position is greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resumable {
    pub video_id: String,
    pub title: String,
    pub position_seconds: i64,
}

/// Use-case layer between the HTTP handlers and the store. Every call
/// takes the request's `SessionContext`; operations on an unresolved
/// identity fail with `Unauthenticated` before any store access.
///
/// Writes propagate store failures so the caller can roll back its
/// optimistic state. Reads degrade to empty/default results with a
/// warning, matching how the UI presents "nothing here yet".
pub struct LibraryService {
    store: Arc<dyn LibraryStore>,
}

impl LibraryService {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    fn require_user<'a>(&self, ctx: &'a SessionContext) -> ServiceResult<&'a Identity> {
        ctx.user().ok_or(ServiceError::Unauthenticated)
    }

    /// Mirrors the provider profile into the store on every sign-in.
    pub async fn record_sign_in(&self, identity: &Identity) -> ServiceResult<()> {
        let profile = UserProfile {
            email: identity.email.clone(),
            displayname: identity.display_name.clone(),
            avatarurl: identity.avatar_url.clone(),
        };
        self.store.upsert_user(&identity.uid, &profile).await?;
        Ok(())
    }

    /// Fired exactly once per explicit "watch" action, never from
    /// background refreshes.
    pub async fn record_watch(
        &self,
        ctx: &SessionContext,
        video_id: &str,
        title: &str,
    ) -> ServiceResult<()> {
        let user = self.require_user(ctx)?;
        self.store.append_history(&user.uid, video_id, title).await?;
        Ok(())
    }

    /// Reads current membership, then adds or removes. Returns the new
    /// membership. Two racing toggles resolve last-write-wins; there is
    /// no lock.
    pub async fn toggle_favorite(
        &self,
        ctx: &SessionContext,
        video_id: &str,
        title: &str,
    ) -> ServiceResult<bool> {
        let user = self.require_user(ctx)?;
        if self.store.has_favorite(&user.uid, video_id).await? {
            self.store.remove_favorite(&user.uid, video_id).await?;
            Ok(false)
        } else {
            self.store.add_favorite(&user.uid, video_id, title).await?;
            Ok(true)
        }
    }

    pub async fn list_favorites(&self, ctx: &SessionContext) -> ServiceResult<Vec<FavoriteEntry>> {
        let user = self.require_user(ctx)?;
        match self.store.list_favorites(&user.uid).await {
            Ok(favorites) => Ok(favorites),
            Err(e) => {
                warn!(uid = %user.uid, "Failed to list favorites: {}", e);
                Ok(Vec::new())
            }
        }
    }

    pub async fn list_history(
        &self,
        ctx: &SessionContext,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<WatchHistoryEntry>> {
        let user = self.require_user(ctx)?;
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        match self.store.list_history(&user.uid, limit).await {
            Ok(history) => Ok(history),
            // A bad limit is a caller bug, not a degraded read.
            Err(e @ DbError::InvalidArgument(_)) => Err(e.into()),
            Err(e) => {
                warn!(uid = %user.uid, "Failed to list history: {}", e);
                Ok(Vec::new())
            }
        }
    }

    pub async fn clear_history(&self, ctx: &SessionContext) -> ServiceResult<()> {
        let user = self.require_user(ctx)?;
        self.store.clear_history(&user.uid).await?;
        Ok(())
    }

    pub async fn save_progress(
        &self,
        ctx: &SessionContext,
        video_id: &str,
        position_seconds: i64,
    ) -> ServiceResult<()> {
        let user = self.require_user(ctx)?;
        self.store
            .save_progress(&user.uid, video_id, position_seconds)
            .await?;
        Ok(())
    }

    pub async fn get_progress(&self, ctx: &SessionContext, video_id: &str) -> ServiceResult<i64> {
        let user = self.require_user(ctx)?;
        match self.store.get_progress(&user.uid, video_id).await {
            Ok(position) => Ok(position),
            Err(e) => {
                warn!(uid = %user.uid, video_id, "Failed to read progress: {}", e);
                Ok(0)
            }
        }
    }

    /// Joins the most recent history page with per-video progress. Only
    /// positions > 0 qualify, ordering follows the history (newest watched
    /// first), and a video appearing several times in history is collapsed
    /// to its most recent occurrence.
    pub async fn compute_resumables(&self, ctx: &SessionContext) -> ServiceResult<Vec<Resumable>> {
        let user = self.require_user(ctx)?;

        let history = match self.store.list_history(&user.uid, DEFAULT_HISTORY_LIMIT).await {
            Ok(history) => history,
            Err(e) => {
                warn!(uid = %user.uid, "Failed to load history for resume: {}", e);
                return Ok(Vec::new());
            }
        };

        let mut seen = HashSet::new();
        let distinct: Vec<&WatchHistoryEntry> = history
            .iter()
            .filter(|entry| seen.insert(entry.videoid.clone()))
            .collect();

        // One independent lookup per distinct video; concurrency is a
        // latency optimization only, order comes from `distinct`.
        let lookups = distinct.iter().map(|entry| {
            let store = Arc::clone(&self.store);
            let uid = user.uid.clone();
            let video_id = entry.videoid.clone();
            async move {
                match store.get_progress(&uid, &video_id).await {
                    Ok(position) => position,
                    Err(e) => {
                        warn!(uid = %uid, video_id = %video_id, "Failed to read progress: {}", e);
                        0
                    }
                }
            }
        });
        let positions = join_all(lookups).await;

        Ok(distinct
            .into_iter()
            .zip(positions)
            .filter(|(_, position)| *position > 0)
            .map(|(entry, position)| Resumable {
                video_id: entry.videoid.clone(),
                title: entry.title.clone(),
                position_seconds: position,
            })
            .collect())
    }

    /// Shapes the history into CSV with an `exported_at` wall-clock
    /// column. An empty history exports a header-only table.
    pub async fn export_history_csv(&self, ctx: &SessionContext) -> ServiceResult<Vec<u8>> {
        let history = self.list_history(ctx, None).await?;
        Ok(export::history_to_csv(&history, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRepository;

    fn service() -> LibraryService {
        LibraryService::new(Arc::new(MemoryRepository::new()))
    }

    fn ctx(uid: &str) -> SessionContext {
        SessionContext::signed_in(Identity {
            uid: uid.to_string(),
            email: Some(format!("{}@example.com", uid)),
            display_name: Some("Test User".to_string()),
            avatar_url: None,
        })
    }

    #[tokio::test]
    async fn anonymous_context_short_circuits() {
        let svc = service();
        let anon = SessionContext::anonymous();

        assert!(matches!(
            svc.record_watch(&anon, "v1", "Popeye").await,
            Err(ServiceError::Unauthenticated)
        ));
        assert!(matches!(
            svc.toggle_favorite(&anon, "v1", "Popeye").await,
            Err(ServiceError::Unauthenticated)
        ));
        assert!(matches!(
            svc.list_favorites(&anon).await,
            Err(ServiceError::Unauthenticated)
        ));
        assert!(matches!(
            svc.save_progress(&anon, "v1", 10).await,
            Err(ServiceError::Unauthenticated)
        ));
        assert!(matches!(
            svc.compute_resumables(&anon).await,
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn favorite_added_and_listed() {
        let svc = service();
        let ctx = ctx("u1");

        let now_member = svc.toggle_favorite(&ctx, "v42", "Tom and Jerry").await.unwrap();
        assert!(now_member);

        let favorites = svc.list_favorites(&ctx).await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].videoid, "v42");
        assert_eq!(favorites[0].title, "Tom and Jerry");
    }

    #[tokio::test]
    async fn toggle_twice_removes_the_favorite() {
        let svc = service();
        let ctx = ctx("u1");

        assert!(svc.toggle_favorite(&ctx, "v42", "Tom and Jerry").await.unwrap());
        assert!(!svc.toggle_favorite(&ctx, "v42", "Tom and Jerry").await.unwrap());
        assert!(svc.list_favorites(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn watch_then_progress_is_resumable() {
        let svc = service();
        let ctx = ctx("u1");

        svc.record_watch(&ctx, "v42", "Tom and Jerry").await.unwrap();
        svc.save_progress(&ctx, "v42", 90).await.unwrap();

        let resumables = svc.compute_resumables(&ctx).await.unwrap();
        assert_eq!(
            resumables,
            vec![Resumable {
                video_id: "v42".to_string(),
                title: "Tom and Jerry".to_string(),
                position_seconds: 90,
            }]
        );
    }

    #[tokio::test]
    async fn resumables_skip_zero_progress_and_collapse_repeats() {
        let svc = service();
        let ctx = ctx("u1");

        svc.record_watch(&ctx, "v42", "Tom and Jerry").await.unwrap();
        svc.record_watch(&ctx, "v7", "Felix the Cat").await.unwrap();
        svc.record_watch(&ctx, "v42", "Tom and Jerry").await.unwrap();

        svc.save_progress(&ctx, "v42", 30).await.unwrap();
        // v7 was watched but never paused mid-way.

        let resumables = svc.compute_resumables(&ctx).await.unwrap();
        assert_eq!(resumables.len(), 1);
        assert_eq!(resumables[0].video_id, "v42");
        assert_eq!(resumables[0].position_seconds, 30);
    }

    #[tokio::test]
    async fn resumables_preserve_history_order() {
        let svc = service();
        let ctx = ctx("u1");

        svc.record_watch(&ctx, "v1", "Popeye").await.unwrap();
        svc.record_watch(&ctx, "v2", "Betty Boop").await.unwrap();
        svc.save_progress(&ctx, "v1", 10).await.unwrap();
        svc.save_progress(&ctx, "v2", 20).await.unwrap();

        let resumables = svc.compute_resumables(&ctx).await.unwrap();
        let order: Vec<&str> = resumables.iter().map(|r| r.video_id.as_str()).collect();
        assert_eq!(order, vec!["v2", "v1"]);
    }

    #[tokio::test]
    async fn explicit_progress_reset_is_reported_as_zero() {
        let svc = service();
        let ctx = ctx("u1");

        svc.save_progress(&ctx, "v42", 90).await.unwrap();
        svc.save_progress(&ctx, "v42", 0).await.unwrap();

        assert_eq!(svc.get_progress(&ctx, "v42").await.unwrap(), 0);
        assert!(svc.compute_resumables(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_defaults_to_twenty_entries() {
        let svc = service();
        let ctx = ctx("u1");

        for i in 0..25 {
            svc.record_watch(&ctx, &format!("v{}", i), "Cartoon").await.unwrap();
        }

        let history = svc.list_history(&ctx, None).await.unwrap();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].videoid, "v24");
    }

    #[tokio::test]
    async fn bad_history_limit_is_not_swallowed() {
        let svc = service();
        let ctx = ctx("u1");

        assert!(matches!(
            svc.list_history(&ctx, Some(0)).await,
            Err(ServiceError::Store(DbError::InvalidArgument(_)))
        ));
    }

    #[tokio::test]
    async fn clear_history_empties_the_log() {
        let svc = service();
        let ctx = ctx("u1");

        svc.record_watch(&ctx, "v1", "Popeye").await.unwrap();
        svc.clear_history(&ctx).await.unwrap();

        assert!(svc.list_history(&ctx, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn export_contains_watched_rows() {
        let svc = service();
        let ctx = ctx("u1");

        svc.record_watch(&ctx, "v42", "Tom and Jerry").await.unwrap();

        let csv = String::from_utf8(svc.export_history_csv(&ctx).await.unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "video_id,title,watched_at,exported_at");
        assert!(lines.next().unwrap().starts_with("v42,Tom and Jerry,"));
        assert!(lines.next().is_none());
    }

    #[tokio::test]
    async fn export_of_empty_history_is_header_only() {
        let svc = service();
        let ctx = ctx("u1");

        let csv = String::from_utf8(svc.export_history_csv(&ctx).await.unwrap()).unwrap();
        assert_eq!(csv, "video_id,title,watched_at,exported_at\n");
    }

    #[tokio::test]
    async fn sign_in_mirrors_the_profile() {
        let svc = service();
        let identity = Identity {
            uid: "u1".to_string(),
            email: Some("u1@example.com".to_string()),
            display_name: Some("User One".to_string()),
            avatar_url: Some("https://example.com/a.png".to_string()),
        };

        svc.record_sign_in(&identity).await.unwrap();

        let user = svc.store.get_user("u1").await.unwrap();
        assert_eq!(user.email.as_deref(), Some("u1@example.com"));
        assert_eq!(user.displayname.as_deref(), Some("User One"));
        assert!(user.lastlogin.is_some());
    }

    #[tokio::test]
    async fn users_do_not_see_each_others_library() {
        let svc = service();
        let alice = ctx("alice");
        let bob = ctx("bob");

        svc.toggle_favorite(&alice, "v1", "Popeye").await.unwrap();
        svc.record_watch(&alice, "v1", "Popeye").await.unwrap();

        assert!(svc.list_favorites(&bob).await.unwrap().is_empty());
        assert!(svc.list_history(&bob, None).await.unwrap().is_empty());
    }
}
