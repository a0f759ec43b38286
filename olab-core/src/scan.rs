//! Wraparound search for the nearest sentence the user has not labeled

use olab_common::models::SentenceId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    /// Position of the first unlabeled sentence
    Found(usize),
    /// Every other position is labeled
    Exhausted,
}

/// Find the next position whose id is not in `labeled`.
///
/// Forward visits `current+1 .. len` then `0 .. current`; backward visits
/// `current-1 .. 0` then `len-1 .. current+1`. The current position itself
/// is never returned.
pub fn scan_unlabeled(
    ids: &[SentenceId],
    current: usize,
    labeled: &HashSet<SentenceId>,
    direction: ScanDirection,
) -> ScanResult {
    let len = ids.len();
    if len == 0 {
        return ScanResult::Exhausted;
    }
    let current = current.min(len - 1);

    for step in 1..len {
        let position = match direction {
            ScanDirection::Forward => (current + step) % len,
            ScanDirection::Backward => (current + len - step) % len,
        };
        if !labeled.contains(&ids[position]) {
            return ScanResult::Found(position);
        }
    }
    ScanResult::Exhausted
}
