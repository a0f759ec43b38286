//! Label editor: span picking and validation
//!
//! A picking mode is armed for one role at a time. The first token click
//! sets a single-token span and remembers it as the anchor, the second click
//! extends the span to cover both clicks and returns to `Idle`. Arming the
//! role that is already armed disarms it.

use olab_common::models::{Label, LabelKind, NewLabel, PropertyId, SentenceId, Span, SpanRole, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Whether each span is needed for a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Required,
    Forbidden,
    Optional,
}

fn span_rules(kind: LabelKind) -> (Rule, Rule) {
    match kind {
        LabelKind::FullAlignment => (Rule::Required, Rule::Required),
        LabelKind::DomainOnly => (Rule::Required, Rule::Forbidden),
        LabelKind::RangeOnly => (Rule::Forbidden, Rule::Required),
        LabelKind::PropertyOnly => (Rule::Optional, Rule::Optional),
        LabelKind::None => (Rule::Forbidden, Rule::Forbidden),
    }
}

/// Check a kind/span combination, including span bounds
pub fn validate_label(
    kind: Option<LabelKind>,
    subject: Option<Span>,
    object: Option<Span>,
    token_count: u32,
) -> Result<LabelKind, ValidationError> {
    let kind = kind.ok_or(ValidationError::MissingKind)?;
    let (subject_rule, object_rule) = span_rules(kind);

    let both_required = subject_rule == Rule::Required && object_rule == Rule::Required;
    if both_required && (subject.is_none() || object.is_none()) {
        return Err(ValidationError::MissingSpans);
    }
    if kind == LabelKind::None && (subject.is_some() || object.is_some()) {
        return Err(ValidationError::SpansNotAllowed);
    }
    match (subject_rule, subject) {
        (Rule::Required, None) => return Err(ValidationError::MissingSubject),
        (Rule::Forbidden, Some(_)) => return Err(ValidationError::SubjectNotAllowed),
        _ => {}
    }
    match (object_rule, object) {
        (Rule::Required, None) => return Err(ValidationError::MissingObject),
        (Rule::Forbidden, Some(_)) => return Err(ValidationError::ObjectNotAllowed),
        _ => {}
    }

    for (role, span) in [(SpanRole::Subject, subject), (SpanRole::Object, object)] {
        if let Some(span) = span {
            if span.start > span.end || span.end >= token_count {
                return Err(ValidationError::SpanOutOfRange {
                    role,
                    start: span.start,
                    end: span.end,
                    token_count,
                });
            }
        }
    }
    Ok(kind)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PickMode {
    Idle,
    Picking {
        role: SpanRole,
        /// First click of the current pick
        anchor: Option<u32>,
    },
}

/// Where the user's label for the current sentence stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelState {
    /// No saved label, no draft
    Unlabeled,
    /// Draft differs from what is saved
    Editing,
    /// Draft matches the saved label
    Saved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    kind: LabelKind,
    subject: Option<Span>,
    object: Option<Span>,
}

/// Draft label for one sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEditor {
    token_count: u32,
    kind: Option<LabelKind>,
    subject: Option<Span>,
    object: Option<Span>,
    mode: PickMode,
    saved: Option<Snapshot>,
}

/// Serializable view of the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorView {
    pub token_count: u32,
    pub kind: Option<LabelKind>,
    pub subject: Option<Span>,
    pub object: Option<Span>,
    pub mode: PickMode,
    pub state: LabelState,
}

impl LabelEditor {
    /// Editor pre-filled with the user's existing label, if any
    pub fn for_sentence(token_count: u32, existing: Option<&Label>) -> Self {
        let saved = existing.map(|l| Snapshot {
            kind: l.kind,
            subject: l.subject,
            object: l.object,
        });
        Self {
            token_count,
            kind: saved.map(|s| s.kind),
            subject: saved.and_then(|s| s.subject),
            object: saved.and_then(|s| s.object),
            mode: PickMode::Idle,
            saved,
        }
    }

    pub fn kind(&self) -> Option<LabelKind> {
        self.kind
    }

    pub fn subject(&self) -> Option<Span> {
        self.subject
    }

    pub fn object(&self) -> Option<Span> {
        self.object
    }

    pub fn mode(&self) -> PickMode {
        self.mode
    }

    pub fn token_count(&self) -> u32 {
        self.token_count
    }

    pub fn state(&self) -> LabelState {
        let current = self.kind.map(|kind| Snapshot {
            kind,
            subject: self.subject,
            object: self.object,
        });
        match (self.saved, current) {
            (Some(saved), Some(current)) if saved == current => LabelState::Saved,
            (None, None) if self.subject.is_none() && self.object.is_none() => {
                LabelState::Unlabeled
            }
            _ => LabelState::Editing,
        }
    }

    /// Arm picking for `role`; arming the armed role disarms it
    pub fn arm(&mut self, role: SpanRole) {
        self.mode = match self.mode {
            PickMode::Picking { role: armed, .. } if armed == role => PickMode::Idle,
            _ => PickMode::Picking { role, anchor: None },
        };
    }

    pub fn disarm(&mut self) {
        self.mode = PickMode::Idle;
    }

    /// Apply a token click to the armed role. Clicks while idle are ignored.
    pub fn click_token(&mut self, index: u32) -> Result<(), ValidationError> {
        if index >= self.token_count {
            return Err(ValidationError::TokenOutOfRange {
                index,
                token_count: self.token_count,
            });
        }
        match self.mode {
            PickMode::Idle => {}
            PickMode::Picking { role, anchor: None } => {
                self.set_span(role, Some(Span::single(index)));
                self.mode = PickMode::Picking {
                    role,
                    anchor: Some(index),
                };
            }
            PickMode::Picking {
                role,
                anchor: Some(anchor),
            } => {
                self.set_span(role, Some(Span::between(anchor, index)));
                self.mode = PickMode::Idle;
            }
        }
        Ok(())
    }

    /// Remove a span; the picking mode is left alone
    pub fn clear(&mut self, role: SpanRole) {
        self.set_span(role, None);
    }

    pub fn set_kind(&mut self, kind: Option<LabelKind>) {
        self.kind = kind;
    }

    /// Select `kind`, or deselect it when it is already selected
    pub fn toggle_kind(&mut self, kind: LabelKind) {
        self.kind = if self.kind == Some(kind) { None } else { Some(kind) };
    }

    fn set_span(&mut self, role: SpanRole, span: Option<Span>) {
        match role {
            SpanRole::Subject => self.subject = span,
            SpanRole::Object => self.object = span,
        }
    }

    pub fn validate(&self) -> Result<LabelKind, ValidationError> {
        validate_label(self.kind, self.subject, self.object, self.token_count)
    }

    /// Validated upsert payload; the editor is not changed
    pub fn draft(
        &self,
        sentence_id: SentenceId,
        property_id: PropertyId,
        user_id: &UserId,
    ) -> Result<NewLabel, ValidationError> {
        let kind = self.validate()?;
        Ok(NewLabel {
            sentence_id,
            user_id: user_id.clone(),
            property_id,
            kind,
            subject: self.subject,
            object: self.object,
        })
    }

    /// Record the persisted label as the saved snapshot
    pub fn mark_saved(&mut self, label: &Label) {
        self.kind = Some(label.kind);
        self.subject = label.subject;
        self.object = label.object;
        self.mode = PickMode::Idle;
        self.saved = Some(Snapshot {
            kind: label.kind,
            subject: label.subject,
            object: label.object,
        });
    }

    pub fn view(&self) -> EditorView {
        EditorView {
            token_count: self.token_count,
            kind: self.kind,
            subject: self.subject,
            object: self.object,
            mode: self.mode,
            state: self.state(),
        }
    }
}
