//! Traversal index
//!
//! Candidate count and ordered id list for one property under one traversal
//! mode. Rebuilt whenever either changes; never mutated in place.

use olab_common::models::{PropertyId, SentenceId};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoreResult;
use crate::store::{SentenceStore, TraversalMode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalIndex {
    pub property_id: PropertyId,
    pub mode: TraversalMode,
    /// Candidate count reported by the backend
    pub count: i64,
    pub ids: Vec<SentenceId>,
}

impl TraversalIndex {
    pub async fn build(
        store: &dyn SentenceStore,
        property_id: PropertyId,
        mode: TraversalMode,
    ) -> StoreResult<Self> {
        let filter = mode.filter();
        let count = store.count_sentences(property_id, filter).await?;
        let ids = store
            .list_sentence_ids(property_id, filter, mode.order())
            .await?;

        // Rows may change between the two reads
        if ids.len() as i64 != count {
            warn!(
                property_id,
                mode = %mode,
                count,
                ids = ids.len(),
                "Sentence count and id list disagree"
            );
        }

        info!(property_id, mode = %mode, count, "Built traversal index");
        Ok(Self {
            property_id,
            mode,
            count,
            ids,
        })
    }

    /// Number of positions that can be navigated
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id_at(&self, position: usize) -> Option<SentenceId> {
        self.ids.get(position).copied()
    }

    pub fn position_of(&self, sentence_id: SentenceId) -> Option<usize> {
        self.ids.iter().position(|&id| id == sentence_id)
    }
}
