//! "My labels": the caller's label history

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use olab_common::events::LabelEvent;
use olab_common::models::{Label, LabelHistoryEntry, LabelKind, SentenceId, Span};
use olab_core::catalog::{label_history, HistoryFilter};
use olab_core::labels::edit_history_label;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, CurrentUser};
use crate::AppState;

/// GET /api/labels?property_id=&kind=&search=&order=newest|oldest
pub async fn list_labels(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<Vec<LabelHistoryEntry>>, ApiError> {
    let entries = label_history(state.catalog.as_ref(), &current.user.id, &filter).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct LabelEdit {
    pub kind: Option<LabelKind>,
    #[serde(default)]
    pub subject: Option<Span>,
    #[serde(default)]
    pub object: Option<Span>,
}

/// PUT /api/labels/:sentence_id
///
/// Rewrites one of the caller's existing labels. Same validation as the
/// labeling view; the sentence counter does not change.
pub async fn edit_label(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(sentence_id): Path<SentenceId>,
    Json(edit): Json<LabelEdit>,
) -> Result<Json<Label>, ApiError> {
    let entry = state
        .catalog
        .list_user_labels(&current.user.id)
        .await?
        .into_iter()
        .find(|e| e.label.sentence_id == sentence_id)
        .ok_or_else(|| ApiError::NotFound(format!("No label on sentence {}", sentence_id)))?;

    let outcome = edit_history_label(
        state.sentences.as_ref(),
        &entry,
        edit.kind,
        edit.subject,
        edit.object,
    )
    .await?;

    info!(user_id = %current.user.id, sentence_id, kind = %outcome.label.kind, "Label edited from history");
    state.label_events.publish(LabelEvent::LabelSaved {
        user_id: outcome.label.user_id.clone(),
        property_id: outcome.label.property_id,
        sentence_id,
        kind: outcome.label.kind,
        delta: outcome.delta(),
    });
    Ok(Json(outcome.label))
}
