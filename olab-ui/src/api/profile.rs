//! Profile and leaderboard

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use olab_common::models::Profile;
use olab_core::catalog::{
    leaderboard, profile_summary, update_display_name, ProfileSummary, LEADERBOARD_SIZE,
};
use serde::Deserialize;

use super::{ApiError, CurrentUser};
use crate::AppState;

/// Largest leaderboard a client may ask for
const MAX_LEADERBOARD: usize = 100;

/// GET /api/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ProfileSummary>, ApiError> {
    let summary = profile_summary(state.catalog.as_ref(), &current.user).await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: String,
}

/// PUT /api/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>, ApiError> {
    let profile =
        update_display_name(state.catalog.as_ref(), &current.user, &update.display_name).await?;
    Ok(Json(profile))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

/// GET /api/leaderboard?limit=
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(LEADERBOARD_SIZE)
        .clamp(1, MAX_LEADERBOARD);
    Ok(Json(leaderboard(state.catalog.as_ref(), limit).await?))
}
