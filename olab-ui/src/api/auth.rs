//! Account endpoints and authentication middleware
//!
//! Protected routes expect `Authorization: Bearer <token>`. The middleware
//! resolves the token through the auth provider, which also enforces the
//! inactivity timeout, and stores a [`CurrentUser`] in the request
//! extensions.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use olab_common::models::User;
use olab_core::catalog::ensure_profile;
use olab_core::error::AuthError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::ApiError;
use crate::AppState;

/// Signed-in user of the current request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub token: String,
    pub user: User,
    pub is_admin: bool,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware for protected routes
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or(AuthError::NotSignedIn)?
        .to_string();

    let user = state
        .auth
        .current_user(&token)
        .await?
        .ok_or(AuthError::NotSignedIn)?;

    let is_admin = state.is_admin(&user);
    request.extensions_mut().insert(CurrentUser {
        token,
        user,
        is_admin,
    });
    Ok(next.run(request).await)
}

/// Layered inside [`auth_middleware`] on the admin routes
pub async fn require_admin(
    Extension(current): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !current.is_admin {
        warn!(user_id = %current.user.id, "Non-admin request to admin route");
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(request).await)
}

/// Create the leaderboard profile; a failure does not fail the sign in
async fn ensure_profile_logged(state: &AppState, user: &User) {
    if let Err(e) = ensure_profile(state.catalog.as_ref(), user).await {
        warn!(user_id = %user.id, "Failed to create profile: {}", e);
    }
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// POST /api/auth/signup
pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let mut user = state.auth.sign_up(&req.email, &req.password).await?;

    if let Some(name) = req.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        match user.metadata.as_object_mut() {
            Some(map) => {
                map.insert("display_name".to_string(), json!(name));
            }
            None => user.metadata = json!({ "display_name": name }),
        }
    }
    ensure_profile_logged(&state, &user).await;

    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub token: String,
    pub user: User,
    pub is_admin: bool,
}

/// POST /api/auth/signin
pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<SignInResponse>, ApiError> {
    let session = state.auth.sign_in(&req.email, &req.password).await?;
    ensure_profile_logged(&state, &session.user).await;

    Ok(Json(SignInResponse {
        is_admin: state.is_admin(&session.user),
        token: session.token,
        user: session.user,
    }))
}

/// POST /api/auth/signout
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.auth.sign_out(&current.token).await?;
    state.sessions.remove(&current.user.id).await;
    Ok(Json(json!({ "status": "signed_out" })))
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

/// POST /api/auth/password
pub async fn update_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<PasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .auth
        .update_password(&current.token, &req.new_password, &req.confirm_password)
        .await?;
    info!(user_id = %current.user.id, "Password changed through API");
    Ok(Json(json!({ "status": "updated" })))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub is_admin: bool,
}

/// GET /api/auth/me
pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user: current.user,
        is_admin: current.is_admin,
    })
}
