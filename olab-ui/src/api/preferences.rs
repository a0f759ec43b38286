//! UI preferences (theme, last opened view)
//!
//! Held in the service configuration and written back to `olab.toml`.

use axum::{extract::State, Extension, Json};
use olab_common::config::{Theme, UiPreferences};
use serde::Deserialize;
use tracing::info;

use super::{ApiError, CurrentUser};
use crate::AppState;

/// Views the browser UI can open
pub const TABS: [&str; 4] = ["labeling", "history", "profile", "admin"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PreferencesUpdate {
    pub theme: Option<Theme>,
    /// Flip dark/light; applied after `theme`
    pub toggle_theme: bool,
    pub active_tab: Option<String>,
}

/// GET /api/preferences
pub async fn get_preferences(State(state): State<AppState>) -> Json<UiPreferences> {
    Json(state.config.read().await.ui.clone())
}

/// PUT /api/preferences
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(update): Json<PreferencesUpdate>,
) -> Result<Json<UiPreferences>, ApiError> {
    if let Some(tab) = update.active_tab.as_deref() {
        if !TABS.contains(&tab) {
            return Err(ApiError::BadRequest(format!("Unknown view: {}", tab)));
        }
        if tab == "admin" && !current.is_admin {
            return Err(ApiError::Forbidden);
        }
    }

    let mut config = state.config.write().await;
    if let Some(theme) = update.theme {
        config.ui.theme = theme;
    }
    if update.toggle_theme {
        config.ui.theme = config.ui.theme.toggled();
    }
    if let Some(tab) = update.active_tab {
        config.ui.active_tab = tab;
    }

    if let Some(path) = &state.config_path {
        config.save(path)?;
        info!(theme = ?config.ui.theme, tab = %config.ui.active_tab, "Saved UI preferences");
    }
    Ok(Json(config.ui.clone()))
}
