//! Domain models shared by the annotation core, the stores and the HTTP layer
//!
//! Rows are owned by the backend; everything here is a plain DTO. Labels are
//! stored flat (`subject_start`, `subject_end`, ...) and exposed to the rest of
//! the code as [`Label`] with optional [`Span`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

pub type PropertyId = i64;
pub type SentenceId = i64;
pub type LabelId = i64;
pub type UserId = String;

/// An ontology relation being studied (domain type -> range type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub domain: String,
    pub range: String,
    /// External reference identifier (e.g. `http://dbpedia.org/ontology/birthPlace`)
    pub iri: String,
    /// Cached number of sentences; may lag behind the sentences table
    #[serde(default)]
    pub sentence_count: i64,
    /// Visible to non-admin users
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub description: Option<String>,
    pub domain_link: Option<String>,
    pub range_link: Option<String>,
}

fn default_active() -> bool {
    true
}

/// A natural-language example text associated with one property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sentence {
    pub id: SentenceId,
    pub property_id: PropertyId,
    pub text: String,
    /// Labels from all users. Maintained by the atomic counter procedure only.
    #[serde(default)]
    pub label_count: i64,
}

impl Sentence {
    /// Whitespace tokenization used for span indices
    pub fn tokens(&self) -> Vec<&str> {
        tokenize(&self.text)
    }
}

/// Split sentence text into the tokens that span indices refer to
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// The five alignment judgments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelKind {
    /// p(D, R): property expressed, domain and range comply
    #[serde(rename = "pdr")]
    FullAlignment,
    /// p(D, ?): property and domain aligned
    #[serde(rename = "pd")]
    DomainOnly,
    /// p(?, R): property and range aligned
    #[serde(rename = "pr")]
    RangeOnly,
    /// p(?, ?): property expressed, domain and range do not align
    #[serde(rename = "p")]
    PropertyOnly,
    /// No alignment
    #[serde(rename = "n")]
    None,
}

impl LabelKind {
    pub const ALL: [LabelKind; 5] = [
        LabelKind::FullAlignment,
        LabelKind::DomainOnly,
        LabelKind::RangeOnly,
        LabelKind::PropertyOnly,
        LabelKind::None,
    ];

    /// Wire/database code
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::FullAlignment => "pdr",
            LabelKind::DomainOnly => "pd",
            LabelKind::RangeOnly => "pr",
            LabelKind::PropertyOnly => "p",
            LabelKind::None => "n",
        }
    }

    /// Human-readable title shown next to the label button
    pub fn title(&self) -> &'static str {
        match self {
            LabelKind::FullAlignment => "Full alignment: p(D, R)",
            LabelKind::DomainOnly => "Property and domain are aligned: p(D, ?)",
            LabelKind::RangeOnly => "Property and range are aligned: p(?, R)",
            LabelKind::PropertyOnly => "Property expressed, but D&R do not align: p(?, ?)",
            LabelKind::None => "No alignment",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pdr" => Ok(LabelKind::FullAlignment),
            "pd" => Ok(LabelKind::DomainOnly),
            "pr" => Ok(LabelKind::RangeOnly),
            "p" => Ok(LabelKind::PropertyOnly),
            "n" => Ok(LabelKind::None),
            other => Err(Error::InvalidInput(format!("Unknown label kind: {}", other))),
        }
    }
}

/// Inclusive token range, `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Single-token span
    pub fn single(index: u32) -> Self {
        Self { start: index, end: index }
    }

    /// Span covering both endpoints regardless of click order
    pub fn between(a: u32, b: u32) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn contains(&self, index: u32) -> bool {
        index >= self.start && index <= self.end
    }

    /// Number of tokens covered
    pub fn token_count(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Rebuild a span from nullable row columns. Both ends must be present.
    pub fn from_columns(start: Option<i64>, end: Option<i64>) -> Option<Self> {
        match (start, end) {
            (Some(s), Some(e)) if s >= 0 && e >= 0 => {
                Some(Span::between(s as u32, e as u32))
            }
            _ => None,
        }
    }
}

/// Which span a selection applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanRole {
    Subject,
    Object,
}

impl SpanRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanRole::Subject => "subject",
            SpanRole::Object => "object",
        }
    }
}

impl fmt::Display for SpanRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's alignment judgment for one sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub sentence_id: SentenceId,
    pub user_id: UserId,
    pub property_id: PropertyId,
    pub kind: LabelKind,
    pub subject: Option<Span>,
    pub object: Option<Span>,
    pub created_at: DateTime<Utc>,
}

/// Flat label row as stored in the `labels` table / REST resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LabelRow {
    pub id: LabelId,
    pub sentence_id: SentenceId,
    pub user_id: UserId,
    pub property_id: PropertyId,
    pub label: String,
    pub subject_start: Option<i64>,
    pub subject_end: Option<i64>,
    pub object_start: Option<i64>,
    pub object_end: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LabelRow> for Label {
    type Error = Error;

    fn try_from(row: LabelRow) -> Result<Self> {
        Ok(Label {
            id: row.id,
            sentence_id: row.sentence_id,
            user_id: row.user_id,
            property_id: row.property_id,
            kind: row.label.parse()?,
            subject: Span::from_columns(row.subject_start, row.subject_end),
            object: Span::from_columns(row.object_start, row.object_end),
            created_at: row.created_at,
        })
    }
}

/// Label content submitted for an upsert keyed on (sentence_id, user_id)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLabel {
    pub sentence_id: SentenceId,
    pub user_id: UserId,
    pub property_id: PropertyId,
    pub kind: LabelKind,
    pub subject: Option<Span>,
    pub object: Option<Span>,
}

/// Flat upsert body; unused spans serialize as explicit nulls
#[derive(Debug, Clone, Serialize)]
pub struct LabelPayload<'a> {
    pub sentence_id: SentenceId,
    pub user_id: &'a str,
    pub property_id: PropertyId,
    pub label: &'static str,
    pub subject_start: Option<i64>,
    pub subject_end: Option<i64>,
    pub object_start: Option<i64>,
    pub object_end: Option<i64>,
}

impl NewLabel {
    pub fn payload(&self) -> LabelPayload<'_> {
        LabelPayload {
            sentence_id: self.sentence_id,
            user_id: &self.user_id,
            property_id: self.property_id,
            label: self.kind.as_str(),
            subject_start: self.subject.map(|s| s.start as i64),
            subject_end: self.subject.map(|s| s.end as i64),
            object_start: self.object.map(|s| s.start as i64),
            object_end: self.object.map(|s| s.end as i64),
        }
    }
}

/// Authenticated user as reported by the auth collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Leaderboard profile; `total_labels` is denormalized and may drift
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub total_labels: i64,
}

/// Per-user progress on one property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyProgress {
    pub total: i64,
    pub labeled: i64,
    pub pct: i64,
}

impl PropertyProgress {
    pub fn new(total: i64, labeled: i64) -> Self {
        let pct = if total > 0 {
            ((labeled as f64 / total as f64) * 100.0).round() as i64
        } else {
            0
        };
        Self { total, labeled, pct }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.labeled >= self.total
    }
}

/// A label of the current user joined with its sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelHistoryEntry {
    #[serde(flatten)]
    pub label: Label,
    pub sentence_text: String,
    pub label_count: i64,
}

/// One exported label row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub sentence_id: SentenceId,
    pub sentence_text: String,
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub label: String,
    pub subject_start: Option<i64>,
    pub subject_end: Option<i64>,
    pub object_start: Option<i64>,
    pub object_end: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ExportRow {
    pub fn from_row(row: LabelRow, sentence_text: String) -> Self {
        Self {
            sentence_id: row.sentence_id,
            sentence_text,
            property_id: row.property_id,
            user_id: row.user_id,
            label: row.label,
            subject_start: row.subject_start,
            subject_end: row.subject_end,
            object_start: row.object_start,
            object_end: row.object_end,
            created_at: row.created_at,
        }
    }
}

/// Contributor entry for the admin dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub user_id: UserId,
    pub count: i64,
}
