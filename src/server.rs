use axum::{extract::Request, http::StatusCode, response::IntoResponse, routing::get, routing::post, Router};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::db::LibraryStore;
use crate::library::LibraryService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<dyn LibraryStore>,
    pub catalog: Arc<CatalogClient>,
    pub library: Arc<LibraryService>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Arc<dyn LibraryStore>,
        catalog: Arc<CatalogClient>,
        library: Arc<LibraryService>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db,
            catalog,
            library,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/login", get(crate::api::auth::login_url))
        .route("/auth/callback", get(crate::api::auth::oauth_callback))
        .route("/auth/logout", post(crate::api::auth::logout));

    let api_routes = Router::new()
        .route("/api/me", get(crate::api::auth::me))
        .route("/api/library/watch", post(crate::api::library::record_watch))
        .route(
            "/api/library/favorites",
            get(crate::api::library::list_favorites),
        )
        .route(
            "/api/library/favorites/toggle",
            post(crate::api::library::toggle_favorite),
        )
        .route(
            "/api/library/history",
            get(crate::api::library::list_history).delete(crate::api::library::clear_history),
        )
        .route(
            "/api/library/history/export",
            get(crate::api::library::export_history),
        )
        .route(
            "/api/library/resume",
            get(crate::api::library::list_resumables),
        )
        .route(
            "/api/library/progress",
            post(crate::api::library::save_progress),
        )
        .route(
            "/api/library/progress/:video_id",
            get(crate::api::library::get_progress),
        )
        .route("/api/catalog/search", get(crate::api::catalog::search))
        .route("/api/catalog/item/:id", get(crate::api::catalog::get_item))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::api::auth::session_middleware,
        ));

    let mut router = Router::new()
        .route("/robots.txt", get(robots_txt_handler))
        .merge(auth_routes)
        .merge(api_routes)
        .fallback(fallback_handler);

    if let Some(ref appdir) = state.config.appdir {
        router = router.fallback_service(ServeDir::new(appdir));
    }

    router
        .layer(axum::middleware::from_fn(crate::middleware::log_request))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn robots_txt_handler() -> &'static str {
    "User-agent: *\nDisallow: /\n"
}

async fn fallback_handler(req: Request<axum::body::Body>) -> impl IntoResponse {
    // CORS preflight for unmatched paths still gets a clean 200.
    if req.method() == axum::http::Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}
