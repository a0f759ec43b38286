//! Backend contract
//!
//! [`SentenceStore`] is everything the annotation session needs;
//! [`CatalogStore`] backs the property list, label history, admin and
//! profile views. Both are implemented by [`sqlite::SqliteStore`] (local
//! database) and [`rest::RestStore`] (hosted PostgREST-style backend).

use async_trait::async_trait;
use olab_common::models::{
    Contributor, ExportRow, Label, LabelHistoryEntry, NewLabel, Profile, Property, PropertyId,
    Sentence, SentenceId,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreResult;

pub mod rest;
pub mod sqlite;

pub use rest::RestStore;
pub use sqlite::SqliteStore;

/// Which sentences are visited and in what order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMode {
    /// Sentences nobody has labeled yet, by id
    #[default]
    Unlabeled,
    /// Every sentence, fewest labels first, then by id
    LeastLabeled,
    /// Every sentence, by id
    All,
}

impl TraversalMode {
    pub fn filter(&self) -> SentenceFilter {
        match self {
            TraversalMode::Unlabeled => SentenceFilter::Unlabeled,
            TraversalMode::LeastLabeled | TraversalMode::All => SentenceFilter::Any,
        }
    }

    pub fn order(&self) -> SentenceOrder {
        match self {
            TraversalMode::LeastLabeled => SentenceOrder::LeastLabeledFirst,
            TraversalMode::Unlabeled | TraversalMode::All => SentenceOrder::IdAsc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TraversalMode::Unlabeled => "unlabeled",
            TraversalMode::LeastLabeled => "least_labeled",
            TraversalMode::All => "all",
        }
    }
}

impl fmt::Display for TraversalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraversalMode {
    type Err = olab_common::Error;

    fn from_str(s: &str) -> olab_common::Result<Self> {
        match s {
            "unlabeled" => Ok(TraversalMode::Unlabeled),
            "least_labeled" => Ok(TraversalMode::LeastLabeled),
            "all" => Ok(TraversalMode::All),
            other => Err(olab_common::Error::InvalidInput(format!(
                "Unknown traversal mode: {}",
                other
            ))),
        }
    }
}

/// Row filter applied on top of `property_id = ?`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceFilter {
    Any,
    /// `label_count = 0`
    Unlabeled,
}

/// Sort order for id lists and batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceOrder {
    /// `id ASC`
    IdAsc,
    /// `label_count ASC NULLS LAST, id ASC`
    LeastLabeledFirst,
}

/// Signed change applied by the atomic counter procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterDelta {
    Increment,
    Decrement,
}

impl CounterDelta {
    pub fn as_i64(&self) -> i64 {
        match self {
            CounterDelta::Increment => 1,
            CounterDelta::Decrement => -1,
        }
    }

    /// Counter value after applying the delta to `current`, never negative
    pub fn apply_to(&self, current: i64) -> i64 {
        (current + self.as_i64()).max(0)
    }
}

/// Everything the annotation session reads and writes
#[async_trait]
pub trait SentenceStore: Send + Sync {
    async fn count_sentences(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
    ) -> StoreResult<i64>;

    async fn list_sentence_ids(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
        order: SentenceOrder,
    ) -> StoreResult<Vec<SentenceId>>;

    async fn fetch_sentence_batch(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
        order: SentenceOrder,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Sentence>>;

    async fn fetch_user_labeled_ids(
        &self,
        property_id: PropertyId,
        user_id: &str,
    ) -> StoreResult<HashSet<SentenceId>>;

    async fn fetch_label(&self, sentence_id: SentenceId, user_id: &str)
        -> StoreResult<Option<Label>>;

    /// Insert or overwrite the label keyed on (sentence_id, user_id)
    async fn upsert_label(&self, label: &NewLabel) -> StoreResult<Label>;

    /// Atomic remote increment/decrement of `sentences.label_count`
    async fn adjust_label_count(
        &self,
        sentence_id: SentenceId,
        delta: CounterDelta,
    ) -> StoreResult<()>;

    /// Plain read of `sentences.label_count` (fallback path only)
    async fn read_label_count(&self, sentence_id: SentenceId) -> StoreResult<i64>;

    /// Plain overwrite of `sentences.label_count` (fallback path only)
    async fn write_label_count(&self, sentence_id: SentenceId, value: i64) -> StoreResult<()>;
}

/// Admin edits to a property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyUpdate {
    pub is_active: Option<bool>,
    pub description: Option<String>,
}

/// Reads and writes behind the dashboard views
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Properties ordered by name; hidden ones only when asked for
    async fn list_properties(&self, include_hidden: bool) -> StoreResult<Vec<Property>>;

    async fn get_property(&self, property_id: PropertyId) -> StoreResult<Option<Property>>;

    async fn update_property(
        &self,
        property_id: PropertyId,
        update: &PropertyUpdate,
    ) -> StoreResult<Property>;

    /// Live sentence count per property
    async fn sentence_totals(&self) -> StoreResult<HashMap<PropertyId, i64>>;

    /// Number of labels the user has per property
    async fn user_label_counts(&self, user_id: &str) -> StoreResult<HashMap<PropertyId, i64>>;

    /// The user's labels joined with sentence text and label_count
    async fn list_user_labels(&self, user_id: &str) -> StoreResult<Vec<LabelHistoryEntry>>;

    async fn count_all_sentences(&self) -> StoreResult<i64>;

    /// `label_count` of every sentence that has at least one label
    async fn labeled_sentence_counts(&self) -> StoreResult<Vec<i64>>;

    /// Label totals per user, unordered
    async fn label_counts_by_user(&self) -> StoreResult<Vec<Contributor>>;

    /// Labels on sentences of the property with `label_count >= min_labels`
    async fn export_labels(
        &self,
        property_id: PropertyId,
        min_labels: i64,
    ) -> StoreResult<Vec<ExportRow>>;

    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<Profile>>;

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<Profile>;

    async fn count_user_labels(&self, user_id: &str) -> StoreResult<i64>;

    /// Profiles ordered by `total_labels` descending
    async fn top_profiles(&self, limit: usize) -> StoreResult<Vec<Profile>>;
}
