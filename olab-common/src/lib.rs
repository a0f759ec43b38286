//! # OLAB Common Library
//!
//! Shared code for the ontology labeler crates:
//! - Domain models (properties, sentences, labels, profiles)
//! - Error and result types
//! - Configuration loading and root folder resolution
//! - Auth and labeling event types
//! - SQLite schema initialization for the local backend
//! - Password hashing and token generation

pub mod config;
pub mod credentials;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use models::{
    Label, LabelKind, NewLabel, Property, PropertyId, Sentence, SentenceId, Span, SpanRole, User,
    UserId,
};
