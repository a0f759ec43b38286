//! Label persistence shared by the session and the history view

use olab_common::models::{tokenize, Label, LabelHistoryEntry, LabelKind, NewLabel, Span};
use tracing::info;

use crate::counter::{adjust_counter, CounterOutcome, LabelChange};
use crate::editor::validate_label;
use crate::error::{SessionError, StoreError};
use crate::store::SentenceStore;

/// Result of a successful label write
#[derive(Debug)]
pub struct SaveOutcome {
    pub label: Label,
    pub change: LabelChange,
    pub counter: CounterOutcome,
}

impl SaveOutcome {
    /// Counter change applied to the sentence
    pub fn delta(&self) -> i64 {
        match self.counter {
            CounterOutcome::Failed { .. } => 0,
            _ => self.change.delta(),
        }
    }
}

/// Upsert a validated label, then adjust the sentence counter.
///
/// An upsert failure is returned and nothing else happens. Counter failures
/// are logged by [`adjust_counter`] and reported in the outcome only.
pub async fn persist_label(
    store: &dyn SentenceStore,
    new_label: &NewLabel,
    change: LabelChange,
    cached_count: i64,
) -> Result<SaveOutcome, StoreError> {
    let label = store.upsert_label(new_label).await?;
    let counter = adjust_counter(store, label.sentence_id, change, cached_count).await;

    info!(
        sentence_id = label.sentence_id,
        user_id = %label.user_id,
        kind = %label.kind,
        delta = change.delta(),
        "Label saved"
    );
    Ok(SaveOutcome {
        label,
        change,
        counter,
    })
}

/// Overwrite a label from the history view. The user already has a label on
/// the sentence, so the counter is not touched.
pub async fn edit_history_label(
    store: &dyn SentenceStore,
    entry: &LabelHistoryEntry,
    kind: Option<LabelKind>,
    subject: Option<Span>,
    object: Option<Span>,
) -> Result<SaveOutcome, SessionError> {
    let token_count = tokenize(&entry.sentence_text).len() as u32;
    let kind = validate_label(kind, subject, object, token_count)?;

    let new_label = NewLabel {
        sentence_id: entry.label.sentence_id,
        user_id: entry.label.user_id.clone(),
        property_id: entry.label.property_id,
        kind,
        subject,
        object,
    };
    persist_label(store, &new_label, LabelChange::Edited, entry.label_count)
        .await
        .map_err(SessionError::Write)
}
