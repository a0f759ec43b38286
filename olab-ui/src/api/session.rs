//! Annotation session endpoints
//!
//! Every endpoint locks the caller's session for the whole operation and
//! answers with the resulting [`SessionView`].

use axum::{extract::State, Extension, Json};
use olab_common::events::LabelEvent;
use olab_common::models::{Label, LabelKind, PropertyId, SpanRole};
use olab_core::catalog::refresh_label_total;
use olab_core::counter::{CounterOutcome, LabelChange};
use olab_core::editor::LabelEditor;
use olab_core::error::ValidationError;
use olab_core::session::SessionView;
use olab_core::store::TraversalMode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ApiError, CurrentUser};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub property_id: PropertyId,
    #[serde(default)]
    pub mode: TraversalMode,
}

/// POST /api/session
///
/// Opens a property in a traversal mode. Also used to switch mode; the
/// pointer always goes back to the first sentence.
pub async fn open_session(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<OpenSessionRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let property = state
        .catalog
        .get_property(req.property_id)
        .await?
        .filter(|p| p.is_active || current.is_admin)
        .ok_or_else(|| ApiError::NotFound(format!("Property {} not found", req.property_id)))?;

    let handle = state.sessions.get(&current.user.id).await;
    let mut session = handle.lock().await;
    session
        .open(state.sentences.as_ref(), property.id, req.mode)
        .await?;
    Ok(Json(session.view()))
}

/// GET /api/session
pub async fn get_session(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Json<SessionView> {
    let handle = state.sessions.get(&current.user.id).await;
    let mut session = handle.lock().await;
    // Retries a window whose fetch failed earlier
    session.ensure_current(state.sentences.as_ref()).await;
    Json(session.view())
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Next,
    Prev,
    NextUnlabeled,
    PrevUnlabeled,
}

async fn step(state: &AppState, current: &CurrentUser, step: Step) -> Result<SessionView, ApiError> {
    let handle = state.sessions.get(&current.user.id).await;
    let mut session = handle.lock().await;
    let store = state.sentences.as_ref();
    match step {
        Step::Next => session.next(store).await?,
        Step::Prev => session.prev(store).await?,
        Step::NextUnlabeled => {
            session.next_unlabeled(store).await?;
        }
        Step::PrevUnlabeled => {
            session.prev_unlabeled(store).await?;
        }
    }
    debug!(user_id = %current.user.id, ?step, position = session.position(), "Moved");
    Ok(session.view())
}

/// POST /api/session/next
pub async fn next_sentence(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<SessionView>, ApiError> {
    step(&state, &current, Step::Next).await.map(Json)
}

/// POST /api/session/prev
pub async fn prev_sentence(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<SessionView>, ApiError> {
    step(&state, &current, Step::Prev).await.map(Json)
}

/// POST /api/session/next-unlabeled
///
/// When every sentence is labeled the pointer stays and the view carries a
/// notice.
pub async fn next_unlabeled(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<SessionView>, ApiError> {
    step(&state, &current, Step::NextUnlabeled).await.map(Json)
}

/// POST /api/session/prev-unlabeled
pub async fn prev_unlabeled(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<SessionView>, ApiError> {
    step(&state, &current, Step::PrevUnlabeled).await.map(Json)
}

/// One interaction with the label editor
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EditorAction {
    /// Start picking a span; arming the armed role disarms it
    Arm { role: SpanRole },
    Disarm,
    /// Token click
    Pick { index: u32 },
    Clear { role: SpanRole },
    /// Set or unset the label kind
    Kind { kind: Option<LabelKind> },
    /// Select a kind, or deselect it when already selected
    ToggleKind { kind: LabelKind },
}

impl EditorAction {
    fn apply(self, editor: &mut LabelEditor) -> Result<(), ValidationError> {
        match self {
            EditorAction::Arm { role } => editor.arm(role),
            EditorAction::Disarm => editor.disarm(),
            EditorAction::Pick { index } => editor.click_token(index)?,
            EditorAction::Clear { role } => editor.clear(role),
            EditorAction::Kind { kind } => editor.set_kind(kind),
            EditorAction::ToggleKind { kind } => editor.toggle_kind(kind),
        }
        Ok(())
    }
}

/// POST /api/session/editor
pub async fn editor_action(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(action): Json<EditorAction>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = state.sessions.get(&current.user.id).await;
    let mut session = handle.lock().await;
    action.apply(session.editor_mut()?)?;
    Ok(Json(session.view()))
}

fn counter_status(outcome: &CounterOutcome) -> &'static str {
    match outcome {
        CounterOutcome::Unchanged => "unchanged",
        CounterOutcome::Atomic => "atomic",
        CounterOutcome::Fallback { .. } => "fallback",
        CounterOutcome::Failed { .. } => "failed",
    }
}

#[derive(Debug, Serialize)]
pub struct SavedLabel {
    pub label: Label,
    pub change: LabelChange,
    /// Change applied to the sentence's label counter
    pub delta: i64,
    pub counter: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub saved: SavedLabel,
    pub session: SessionView,
}

/// POST /api/session/save
///
/// Validation failures answer 422 and change nothing. On success the
/// pointer has moved to the next sentence.
pub async fn save_label(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<SaveResponse>, ApiError> {
    let handle = state.sessions.get(&current.user.id).await;
    let (outcome, view) = {
        let mut session = handle.lock().await;
        let outcome = session.save(state.sentences.as_ref()).await?;
        (outcome, session.view())
    };

    let delta = outcome.delta();
    state.label_events.publish(LabelEvent::LabelSaved {
        user_id: outcome.label.user_id.clone(),
        property_id: outcome.label.property_id,
        sentence_id: outcome.label.sentence_id,
        kind: outcome.label.kind,
        delta,
    });

    if outcome.change == LabelChange::Created {
        if let Err(e) = refresh_label_total(state.catalog.as_ref(), &current.user).await {
            warn!(user_id = %current.user.id, "Failed to refresh profile total: {}", e);
        }
    }

    Ok(Json(SaveResponse {
        saved: SavedLabel {
            counter: counter_status(&outcome.counter),
            change: outcome.change,
            label: outcome.label,
            delta,
        },
        session: view,
    }))
}
