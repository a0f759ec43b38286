//! olab-core - annotation engine for the ontology labeler
//!
//! Owns the labeling workflow for one user at a time:
//! - [`traversal`]: ordered sentence ids per traversal mode
//! - [`buffer`]: sparse, batch-aligned sentence buffer with generation guard
//! - [`editor`]: span picking and label validation
//! - [`scan`]: wraparound search for the nearest unlabeled sentence
//! - [`counter`]: atomic label counter with direct-update fallback
//! - [`session`]: the annotation session tying the above together
//!
//! Durable state lives behind the [`store`] traits (SQLite or hosted REST)
//! and identity behind [`auth::AuthProvider`].

pub mod auth;
pub mod buffer;
pub mod catalog;
pub mod counter;
pub mod editor;
pub mod error;
pub mod labels;
pub mod scan;
pub mod session;
pub mod store;
pub mod traversal;

pub use error::{AuthError, SessionError, StoreError, StoreResult, ValidationError};
pub use session::AnnotationSession;
pub use store::{CatalogStore, SentenceStore, TraversalMode};
