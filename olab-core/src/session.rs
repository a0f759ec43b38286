//! Annotation session
//!
//! One user's walk through one property's sentences. Owns the traversal
//! index, the sparse buffer, the set of sentence ids the user has labeled
//! and the label editor for the current sentence. Every operation that
//! talks to the backend takes the store explicitly.
//!
//! Opening a property (or switching mode) rebuilds everything and puts the
//! pointer back at position 0. Saving validates, upserts, adjusts the
//! sentence counter, updates local state optimistically and advances.

use olab_common::models::{Label, PropertyId, Sentence, SentenceId, UserId};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::buffer::{FillOutcome, SparseBuffer};
use crate::counter::{CounterOutcome, LabelChange};
use crate::editor::{EditorView, LabelEditor};
use crate::error::SessionError;
use crate::labels::{persist_label, SaveOutcome};
use crate::scan::{scan_unlabeled, ScanDirection, ScanResult};
use crate::store::{SentenceStore, TraversalMode};
use crate::traversal::TraversalIndex;

/// Shown when a scan finds nothing
pub const EXHAUSTED_NOTICE: &str = "All sentences in this view are labeled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// No property opened yet
    Idle,
    Ready,
    /// The traversal has no sentences
    Empty,
    /// Initial count/id load failed
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceView {
    pub id: SentenceId,
    pub text: String,
    pub tokens: Vec<String>,
    pub label_count: i64,
}

impl From<&Sentence> for SentenceView {
    fn from(s: &Sentence) -> Self {
        Self {
            id: s.id,
            text: s.text.clone(),
            tokens: s.tokens().into_iter().map(str::to_string).collect(),
            label_count: s.label_count,
        }
    }
}

/// Snapshot returned to the browser after every session operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub status: SessionStatus,
    pub property_id: Option<PropertyId>,
    pub mode: TraversalMode,
    pub position: usize,
    pub total: usize,
    pub labeled_count: usize,
    pub sentence: Option<SentenceView>,
    pub is_labeled: bool,
    pub editor: Option<EditorView>,
    pub exhausted: bool,
    pub notice: Option<String>,
}

#[derive(Debug)]
pub struct AnnotationSession {
    user_id: UserId,
    property_id: Option<PropertyId>,
    mode: TraversalMode,
    index: Option<TraversalIndex>,
    buffer: SparseBuffer,
    labeled_ids: HashSet<SentenceId>,
    /// False while `labeled_ids` could not be fetched; saves then ask the
    /// backend for the user's label before picking the counter delta
    labeled_ids_loaded: bool,
    position: usize,
    current_label: Option<Label>,
    editor: Option<LabelEditor>,
    status: SessionStatus,
    notice: Option<String>,
}

impl AnnotationSession {
    pub fn new(user_id: impl Into<UserId>, batch_size: usize) -> Self {
        Self {
            user_id: user_id.into(),
            property_id: None,
            mode: TraversalMode::default(),
            index: None,
            buffer: SparseBuffer::new(batch_size),
            labeled_ids: HashSet::new(),
            labeled_ids_loaded: false,
            position: 0,
            current_label: None,
            editor: None,
            status: SessionStatus::Idle,
            notice: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn property_id(&self) -> Option<PropertyId> {
        self.property_id
    }

    pub fn mode(&self) -> TraversalMode {
        self.mode
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn index(&self) -> Option<&TraversalIndex> {
        self.index.as_ref()
    }

    pub fn buffer(&self) -> &SparseBuffer {
        &self.buffer
    }

    pub fn labeled_ids(&self) -> &HashSet<SentenceId> {
        &self.labeled_ids
    }

    pub fn current_label(&self) -> Option<&Label> {
        self.current_label.as_ref()
    }

    pub fn current_sentence(&self) -> Option<&Sentence> {
        self.buffer.get(self.position)
    }

    pub fn editor(&self) -> Option<&LabelEditor> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Result<&mut LabelEditor, SessionError> {
        let position = self.position;
        self.editor.as_mut().ok_or(SessionError::NoSentence(position))
    }

    fn len(&self) -> usize {
        self.index.as_ref().map(TraversalIndex::len).unwrap_or(0)
    }

    /// Open a property in a traversal mode, discarding all previous state
    pub async fn open(
        &mut self,
        store: &dyn SentenceStore,
        property_id: PropertyId,
        mode: TraversalMode,
    ) -> Result<(), SessionError> {
        info!(user_id = %self.user_id, property_id, mode = %mode, "Opening annotation session");

        self.property_id = Some(property_id);
        self.mode = mode;
        self.position = 0;
        self.index = None;
        self.labeled_ids.clear();
        self.labeled_ids_loaded = false;
        self.current_label = None;
        self.editor = None;
        self.notice = None;
        let ticket = self.buffer.reset();

        let index = match TraversalIndex::build(store, property_id, mode).await {
            Ok(index) => index,
            Err(e) => {
                warn!(property_id, "Failed to load traversal index: {}", e);
                self.buffer.abandon(ticket);
                self.status = SessionStatus::Failed {
                    message: e.to_string(),
                };
                return Err(SessionError::Load(e));
            }
        };

        self.reload_labeled_ids(store).await;

        let result = store
            .fetch_sentence_batch(
                property_id,
                mode.filter(),
                mode.order(),
                ticket.offset,
                ticket.limit,
            )
            .await;
        if self.buffer.complete(ticket, result) == FillOutcome::Failed {
            warn!(property_id, "First sentence batch not loaded, will retry on access");
        }

        self.status = if index.is_empty() {
            SessionStatus::Empty
        } else {
            SessionStatus::Ready
        };
        self.index = Some(index);
        self.load_current(store).await;
        Ok(())
    }

    /// Make sure the current position is in the buffer, fetching its window
    /// if needed. Returns whether the sentence is available.
    pub async fn ensure_current(&mut self, store: &dyn SentenceStore) -> bool {
        let Some(property_id) = self.property_id else {
            return false;
        };
        if let Some(ticket) = self.buffer.begin_fetch(self.position) {
            debug!(position = self.position, offset = ticket.offset, "Fetching sentence window");
            let result = store
                .fetch_sentence_batch(
                    property_id,
                    self.mode.filter(),
                    self.mode.order(),
                    ticket.offset,
                    ticket.limit,
                )
                .await;
            self.buffer.complete(ticket, result);
        }
        self.buffer.contains(self.position)
    }

    /// Fetch the user's labeled ids unless an earlier fetch succeeded.
    /// Ids saved in this session are kept.
    async fn reload_labeled_ids(&mut self, store: &dyn SentenceStore) {
        let Some(property_id) = self.property_id else {
            return;
        };
        if self.labeled_ids_loaded {
            return;
        }
        match store.fetch_user_labeled_ids(property_id, &self.user_id).await {
            Ok(ids) => {
                self.labeled_ids.extend(ids);
                self.labeled_ids_loaded = true;
            }
            Err(e) => warn!(property_id, "Failed to load labeled sentence ids: {}", e),
        }
    }

    /// Load the sentence, the user's label on it and a fresh editor
    async fn load_current(&mut self, store: &dyn SentenceStore) {
        self.current_label = None;
        self.editor = None;
        if self.len() == 0 || !self.ensure_current(store).await {
            return;
        }
        let Some(sentence) = self.buffer.get(self.position) else {
            return;
        };
        let sentence_id = sentence.id;
        let token_count = sentence.tokens().len() as u32;

        self.reload_labeled_ids(store).await;
        if self.labeled_ids.contains(&sentence_id) || !self.labeled_ids_loaded {
            match store.fetch_label(sentence_id, &self.user_id).await {
                Ok(label) => {
                    if label.is_some() {
                        self.labeled_ids.insert(sentence_id);
                    }
                    self.current_label = label;
                }
                Err(e) => warn!(sentence_id, "Failed to load existing label: {}", e),
            }
        }
        self.editor = Some(LabelEditor::for_sentence(
            token_count,
            self.current_label.as_ref(),
        ));
    }

    fn require_open(&self) -> Result<(), SessionError> {
        if self.property_id.is_none() {
            return Err(SessionError::NoProperty);
        }
        Ok(())
    }

    /// Move to an absolute position
    pub async fn go_to(
        &mut self,
        store: &dyn SentenceStore,
        position: usize,
    ) -> Result<(), SessionError> {
        self.require_open()?;
        if position >= self.len() {
            return Err(SessionError::NoSentence(position));
        }
        self.notice = None;
        self.position = position;
        self.load_current(store).await;
        Ok(())
    }

    /// Next position, wrapping to the start
    pub async fn next(&mut self, store: &dyn SentenceStore) -> Result<(), SessionError> {
        self.require_open()?;
        let len = self.len();
        if len == 0 {
            return Ok(());
        }
        self.go_to(store, (self.position + 1) % len).await
    }

    /// Previous position, wrapping to the end
    pub async fn prev(&mut self, store: &dyn SentenceStore) -> Result<(), SessionError> {
        self.require_open()?;
        let len = self.len();
        if len == 0 {
            return Ok(());
        }
        self.go_to(store, (self.position + len - 1) % len).await
    }

    pub async fn next_unlabeled(
        &mut self,
        store: &dyn SentenceStore,
    ) -> Result<ScanResult, SessionError> {
        self.jump_unlabeled(store, ScanDirection::Forward).await
    }

    pub async fn prev_unlabeled(
        &mut self,
        store: &dyn SentenceStore,
    ) -> Result<ScanResult, SessionError> {
        self.jump_unlabeled(store, ScanDirection::Backward).await
    }

    async fn jump_unlabeled(
        &mut self,
        store: &dyn SentenceStore,
        direction: ScanDirection,
    ) -> Result<ScanResult, SessionError> {
        self.require_open()?;
        let ids = self.index.as_ref().map(|i| i.ids.as_slice()).unwrap_or(&[]);
        let result = scan_unlabeled(ids, self.position, &self.labeled_ids, direction);
        match result {
            ScanResult::Found(position) => self.go_to(store, position).await?,
            ScanResult::Exhausted => {
                info!(user_id = %self.user_id, "No unlabeled sentence left in traversal");
                self.notice = Some(EXHAUSTED_NOTICE.to_string());
            }
        }
        Ok(result)
    }

    /// Validate and persist the editor's label, then advance.
    ///
    /// A validation, label lookup or upsert failure leaves every piece of
    /// state as it was.
    pub async fn save(&mut self, store: &dyn SentenceStore) -> Result<SaveOutcome, SessionError> {
        let property_id = self.property_id.ok_or(SessionError::NoProperty)?;
        let position = self.position;
        let sentence = self
            .buffer
            .get(position)
            .cloned()
            .ok_or(SessionError::NoSentence(position))?;
        let editor = self
            .editor
            .as_ref()
            .ok_or(SessionError::NoSentence(position))?;

        let draft = editor.draft(sentence.id, property_id, &self.user_id)?;

        let had_prior = if self.labeled_ids.contains(&sentence.id) || self.current_label.is_some() {
            true
        } else if self.labeled_ids_loaded {
            false
        } else {
            // Labeled ids never loaded; ask for this sentence directly
            store
                .fetch_label(sentence.id, &self.user_id)
                .await
                .map_err(SessionError::Load)?
                .is_some()
        };
        let change = LabelChange::for_save(had_prior);

        let outcome = persist_label(store, &draft, change, sentence.label_count)
            .await
            .map_err(SessionError::Write)?;

        if let Some(cached) = self.buffer.get_mut(position) {
            cached.label_count = match outcome.counter {
                CounterOutcome::Fallback { written } => written,
                _ => (cached.label_count + change.delta()).max(0),
            };
        }
        self.labeled_ids.insert(sentence.id);
        if let Some(editor) = self.editor.as_mut() {
            editor.mark_saved(&outcome.label);
        }
        self.current_label = Some(outcome.label.clone());

        self.next(store).await?;
        Ok(outcome)
    }

    pub fn view(&self) -> SessionView {
        let sentence = self.current_sentence();
        SessionView {
            status: self.status.clone(),
            property_id: self.property_id,
            mode: self.mode,
            position: self.position,
            total: self.len(),
            labeled_count: self.labeled_ids.len(),
            sentence: sentence.map(SentenceView::from),
            is_labeled: sentence
                .map(|s| self.labeled_ids.contains(&s.id))
                .unwrap_or(false),
            editor: self.editor.as_ref().map(LabelEditor::view),
            exhausted: self.buffer.is_exhausted(),
            notice: self.notice.clone(),
        }
    }
}
