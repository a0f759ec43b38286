//! Property list with the caller's progress

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use olab_common::models::PropertyId;
use olab_core::catalog::{auto_select, next_property, property_overview, PropertyOverview};
use serde::{Deserialize, Serialize};

use super::{ApiError, CurrentUser};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PropertiesQuery {
    /// Currently opened property, used to compute `next_property`
    pub current: Option<PropertyId>,
}

#[derive(Debug, Serialize)]
pub struct PropertiesResponse {
    pub properties: Vec<PropertyOverview>,
    /// First property the user has not finished
    pub auto_select: Option<PropertyId>,
    pub next_property: Option<PropertyId>,
}

/// GET /api/properties
///
/// Admins also see hidden properties.
pub async fn list_properties(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<PropertiesQuery>,
) -> Result<Json<PropertiesResponse>, ApiError> {
    let properties =
        property_overview(state.catalog.as_ref(), &current.user.id, current.is_admin).await?;
    Ok(Json(PropertiesResponse {
        auto_select: auto_select(&properties),
        next_property: query.current.and_then(|id| next_property(&properties, id)),
        properties,
    }))
}
