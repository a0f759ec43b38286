//! Error types for olab-core
//!
//! Remote failures are caught at the call site and mapped into these enums;
//! none of them is fatal to the process.

use olab_common::models::SpanRole;
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Backend (store) failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport failure talking to the hosted backend
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Local database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Row decoding / conversion failure
    #[error("Invalid row: {0}")]
    InvalidRow(#[from] olab_common::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend call did not finish within the configured timeout
    #[error("Backend call timed out")]
    Timeout,
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StoreError::Timeout
        } else if e.is_decode() {
            StoreError::Parse(e.to_string())
        } else {
            StoreError::Network(e.to_string())
        }
    }
}

/// Kind/span combination rejected before any write
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Choose a label")]
    MissingKind,

    #[error("Select subject and object spans")]
    MissingSpans,

    #[error("Select subject span")]
    MissingSubject,

    #[error("Select object span")]
    MissingObject,

    #[error("Clear object span for \"pd\" (Property Domain)")]
    ObjectNotAllowed,

    #[error("Clear subject span for \"pr\" (Property Range)")]
    SubjectNotAllowed,

    #[error("No spans should be selected for \"n\"")]
    SpansNotAllowed,

    #[error("Token {index} is outside the sentence ({token_count} tokens)")]
    TokenOutOfRange { index: u32, token_count: u32 },

    #[error("{role} span {start}..{end} is outside the sentence ({token_count} tokens)")]
    SpanOutOfRange {
        role: SpanRole,
        start: u32,
        end: u32,
        token_count: u32,
    },
}

impl ValidationError {
    /// Form field the error belongs to
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingKind => "label",
            ValidationError::MissingSpans | ValidationError::SpansNotAllowed => "spans",
            ValidationError::MissingSubject | ValidationError::SubjectNotAllowed => "subject",
            ValidationError::MissingObject | ValidationError::ObjectNotAllowed => "object",
            ValidationError::TokenOutOfRange { .. } => "token",
            ValidationError::SpanOutOfRange { role, .. } => role.as_str(),
        }
    }
}

/// Auth collaborator failures
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("An account with this email already exists.")]
    AlreadyRegistered,

    #[error("Session expired due to inactivity. Please sign in again.")]
    SessionExpired,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<olab_common::Error> for AuthError {
    fn from(e: olab_common::Error) -> Self {
        match e {
            olab_common::Error::InvalidInput(msg) => AuthError::InvalidInput(msg),
            other => AuthError::Store(StoreError::InvalidRow(other)),
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Store(StoreError::Database(e))
    }
}

/// Annotation session failures
#[derive(Error, Debug)]
pub enum SessionError {
    /// Initial count/index load failed; the session shows an error state
    #[error("Failed to load sentences: {0}")]
    Load(StoreError),

    /// Label rejected locally; nothing was written
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Label upsert failed; the pointer did not advance
    #[error("Failed to save label: {0}")]
    Write(StoreError),

    #[error("No property selected")]
    NoProperty,

    /// Current sentence is not loaded (yet)
    #[error("No sentence loaded at position {0}")]
    NoSentence(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}
