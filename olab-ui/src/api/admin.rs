//! Admin dashboard: statistics, export, property visibility

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use olab_common::events::LabelEvent;
use olab_common::models::{Property, PropertyId};
use olab_core::catalog::{self, AdminStats};
use olab_core::store::PropertyUpdate;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, CurrentUser};
use crate::AppState;

/// GET /api/admin/stats
pub async fn admin_stats(State(state): State<AppState>) -> Result<Json<AdminStats>, ApiError> {
    Ok(Json(catalog::admin_stats(state.catalog.as_ref()).await?))
}

fn default_min_labels() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// Export one property; all properties when absent
    pub property_id: Option<PropertyId>,
    #[serde(default = "default_min_labels")]
    pub min_labels: i64,
}

/// GET /api/admin/export?property_id=&min_labels=
///
/// JSON array of label rows, served as a file download.
pub async fn export_labels(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let file =
        catalog::export_labels(state.catalog.as_ref(), query.property_id, query.min_labels).await?;
    let disposition = format!("attachment; filename=\"{}\"", file.file_name);
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(file.rows)).into_response())
}

/// PUT /api/admin/properties/:id
pub async fn update_property(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(property_id): Path<PropertyId>,
    Json(update): Json<PropertyUpdate>,
) -> Result<Json<Property>, ApiError> {
    if update.is_active.is_none() && update.description.is_none() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    let property = state.catalog.update_property(property_id, &update).await?;
    info!(
        user_id = %current.user.id,
        property_id,
        is_active = property.is_active,
        "Property updated"
    );
    if update.is_active.is_some() {
        state.label_events.publish(LabelEvent::PropertyVisibilityChanged {
            property_id,
            is_active: property.is_active,
        });
    }
    Ok(Json(property))
}
