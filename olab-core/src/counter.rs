//! Label counter maintenance
//!
//! `sentences.label_count` is shared by every user. It is only changed
//! through the backend's atomic increment/decrement procedure. When that
//! call fails the counter is patched with a read-then-write of the value,
//! which can lose a concurrent update. A failure of both is logged and the
//! saved label is kept.

use olab_common::models::SentenceId;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::store::{CounterDelta, SentenceStore};

/// How a save changed the user's label on a sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelChange {
    /// First label by this user on the sentence
    Created,
    /// Overwrote the user's existing label
    Edited,
    /// Explicit removal of the user's label
    Removed,
}

impl LabelChange {
    /// Classify an upsert by whether the user already had a label
    pub fn for_save(had_prior: bool) -> Self {
        if had_prior {
            LabelChange::Edited
        } else {
            LabelChange::Created
        }
    }

    pub fn counter_delta(&self) -> Option<CounterDelta> {
        match self {
            LabelChange::Created => Some(CounterDelta::Increment),
            LabelChange::Edited => None,
            LabelChange::Removed => Some(CounterDelta::Decrement),
        }
    }

    /// Signed delta (+1, 0, -1)
    pub fn delta(&self) -> i64 {
        self.counter_delta().map(|d| d.as_i64()).unwrap_or(0)
    }
}

#[derive(Debug)]
pub enum CounterOutcome {
    /// Nothing to adjust
    Unchanged,
    Atomic,
    /// Atomic call failed, counter overwritten with `written`
    Fallback { written: i64 },
    /// Both paths failed; counter left as is
    Failed {
        atomic_error: StoreError,
        fallback_error: StoreError,
    },
}

impl CounterOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, CounterOutcome::Failed { .. })
    }
}

/// Apply `change` to the sentence counter.
///
/// `cached_count` is the locally known count, used as the base when the
/// fallback read also fails.
pub async fn adjust_counter(
    store: &dyn SentenceStore,
    sentence_id: SentenceId,
    change: LabelChange,
    cached_count: i64,
) -> CounterOutcome {
    let Some(delta) = change.counter_delta() else {
        return CounterOutcome::Unchanged;
    };

    let atomic_error = match store.adjust_label_count(sentence_id, delta).await {
        Ok(()) => {
            debug!(sentence_id, delta = delta.as_i64(), "Label counter adjusted");
            return CounterOutcome::Atomic;
        }
        Err(e) => e,
    };
    warn!(sentence_id, "Atomic counter update failed, using direct update: {}", atomic_error);

    let base = match store.read_label_count(sentence_id).await {
        Ok(count) => count,
        Err(e) => {
            warn!(sentence_id, cached_count, "Counter read failed, using cached count: {}", e);
            cached_count
        }
    };
    let written = delta.apply_to(base);

    match store.write_label_count(sentence_id, written).await {
        Ok(()) => CounterOutcome::Fallback { written },
        Err(fallback_error) => {
            error!(
                sentence_id,
                "Label counter not updated: atomic: {}; direct: {}", atomic_error, fallback_error
            );
            CounterOutcome::Failed {
                atomic_error,
                fallback_error,
            }
        }
    }
}
