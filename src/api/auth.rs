use std::collections::HashMap;

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, warn};

use super::types::*;
use crate::db::AccessToken;
use crate::server::AppState;
use crate::session::{Identity, SessionContext};

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// GET /auth/login
/// Returns the Google authorization URL the front end should send the
/// browser to.
pub async fn login_url(State(state): State<AppState>) -> Json<LoginUrlResponse> {
    let google = &state.config.google;
    let url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
        AUTHORIZATION_ENDPOINT,
        urlencoding::encode(&google.client_id),
        urlencoding::encode(&google.redirect_uri),
        urlencoding::encode("openid email profile"),
    );
    Json(LoginUrlResponse { url })
}

/// GET /auth/callback?code=...
/// Exchanges the authorization code, fetches the Google profile, mirrors
/// it into the store and issues an opaque API token.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<AuthResponse>, StatusCode> {
    let code = params.get("code").ok_or(StatusCode::BAD_REQUEST)?;
    let google = &state.config.google;

    let client = reqwest::Client::new();

    let token_response = client
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("code", code.as_str()),
            ("client_id", google.client_id.as_str()),
            ("client_secret", google.client_secret.as_str()),
            ("redirect_uri", google.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| {
            error!("OAuth token exchange failed: {}", e);
            StatusCode::BAD_GATEWAY
        })?;

    if !token_response.status().is_success() {
        warn!("OAuth token exchange rejected: {}", token_response.status());
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token: TokenResponse = token_response.json().await.map_err(|e| {
        error!("OAuth token response malformed: {}", e);
        StatusCode::BAD_GATEWAY
    })?;

    let userinfo: GoogleUserInfo = client
        .get(USERINFO_ENDPOINT)
        .bearer_auth(&token.access_token)
        .send()
        .await
        .map_err(|e| {
            error!("OAuth userinfo fetch failed: {}", e);
            StatusCode::BAD_GATEWAY
        })?
        .json()
        .await
        .map_err(|e| {
            error!("OAuth userinfo malformed: {}", e);
            StatusCode::BAD_GATEWAY
        })?;

    let (sub, email) = match (userinfo.sub, userinfo.email) {
        (Some(sub), Some(email)) => (sub, email),
        _ => {
            warn!("OAuth userinfo missing sub or email");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let identity = Identity {
        uid: sub,
        email: Some(email),
        display_name: userinfo.name,
        avatar_url: userinfo.picture,
    };

    state
        .library
        .record_sign_in(&identity)
        .await
        .map_err(|e| super::status_for(&e))?;

    let api_token = AccessToken {
        token: uuid::Uuid::new_v4().to_string(),
        userid: identity.uid.clone(),
        created: Some(Utc::now()),
    };

    state
        .db
        .insert_token(&api_token)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(AuthResponse {
        access_token: api_token.token,
        user: identity,
    }))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    req: Request,
) -> StatusCode {
    if let Some(token) = extract_token(&req, &params) {
        if let Err(e) = state.db.delete_token(&token).await {
            warn!("Failed to delete token on logout: {}", e);
        }
    }
    StatusCode::NO_CONTENT
}

/// GET /api/me
pub async fn me(Extension(ctx): Extension<SessionContext>) -> Result<Json<Identity>, StatusCode> {
    ctx.user().cloned().map(Json).ok_or(StatusCode::UNAUTHORIZED)
}

/// Resolves the request's API token to a `SessionContext` and attaches
/// it as an extension. Requests without a valid token proceed as
/// anonymous; the service layer rejects them per operation.
pub async fn session_middleware(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let mut ctx = SessionContext::anonymous();

    if let Some(token_str) = extract_token(&req, &params) {
        if let Ok(token) = state.db.get_token(&token_str).await {
            match state.db.get_user(&token.userid).await {
                Ok(user) => {
                    ctx = SessionContext::signed_in(Identity {
                        uid: user.id,
                        email: user.email,
                        display_name: user.displayname,
                        avatar_url: user.avatarurl,
                    });
                }
                Err(e) => {
                    warn!(uid = %token.userid, "Token resolved but user load failed: {}", e);
                }
            }
        }
    }

    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

fn extract_token<B>(
    req: &axum::http::Request<B>,
    params: &HashMap<String, String>,
) -> Option<String> {
    if let Some(auth_header) = req.headers().get("Authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(token) = req
        .headers()
        .get("X-Api-Token")
        .and_then(|h| h.to_str().ok())
    {
        return Some(token.to_string());
    }

    if let Some(token) = params.get("api_key") {
        return Some(token.clone());
    }

    None
}
