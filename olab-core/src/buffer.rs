//! Sparse sentence buffer
//!
//! Maps traversal positions to sentence records, filled one batch window at
//! a time. Fetching is split into [`SparseBuffer::begin_fetch`] (decide what
//! to load and tag it) and [`SparseBuffer::complete`] (merge the response),
//! so the caller can run the backend call without holding the buffer.
//!
//! Invariants:
//! - at most one non-reset fetch is in flight
//! - a response tagged with an older generation is dropped
//! - records are merged by absolute offset, so out-of-order responses land
//!   in the right positions

use olab_common::models::Sentence;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Identifies one batch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub offset: usize,
    pub limit: usize,
    /// Reset fetches bypass the in-flight guard and replace the buffer
    pub is_reset: bool,
}

/// What happened to a completed fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// Generation moved on; response discarded
    Stale,
    Merged { count: usize },
    /// Backend call failed; positions stay empty until next access
    Failed,
}

#[derive(Debug)]
pub struct SparseBuffer {
    batch_size: usize,
    slots: BTreeMap<usize, Sentence>,
    generation: u64,
    in_flight: Option<FetchTicket>,
    exhausted: bool,
}

impl SparseBuffer {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            slots: BTreeMap::new(),
            generation: 0,
            in_flight: None,
            exhausted: false,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The last batch came back short
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start offset of the batch window containing `position`
    pub fn window_for(&self, position: usize) -> usize {
        (position / self.batch_size) * self.batch_size
    }

    pub fn get(&self, position: usize) -> Option<&Sentence> {
        self.slots.get(&position)
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut Sentence> {
        self.slots.get_mut(&position)
    }

    pub fn contains(&self, position: usize) -> bool {
        self.slots.contains_key(&position)
    }

    pub fn loaded_count(&self) -> usize {
        self.slots.len()
    }

    /// Invalidate everything and issue the first-window fetch for a new
    /// traversal. Any fetch still in flight becomes stale.
    pub fn reset(&mut self) -> FetchTicket {
        self.generation += 1;
        self.slots.clear();
        self.exhausted = false;
        let ticket = FetchTicket {
            generation: self.generation,
            offset: 0,
            limit: self.batch_size,
            is_reset: true,
        };
        self.in_flight = Some(ticket);
        debug!(generation = self.generation, "Buffer reset");
        ticket
    }

    /// Ticket for the window holding `position`, or `None` when the position
    /// is already loaded or another fetch is in flight
    pub fn begin_fetch(&mut self, position: usize) -> Option<FetchTicket> {
        if self.contains(position) || self.in_flight.is_some() {
            return None;
        }
        let ticket = FetchTicket {
            generation: self.generation,
            offset: self.window_for(position),
            limit: self.batch_size,
            is_reset: false,
        };
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    /// Drop a ticket whose request was never sent
    pub fn abandon(&mut self, ticket: FetchTicket) {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
    }

    /// Merge a fetch response
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Sentence>, StoreError>,
    ) -> FillOutcome {
        if ticket.generation != self.generation {
            debug!(
                ticket_generation = ticket.generation,
                generation = self.generation,
                "Dropping stale batch"
            );
            return FillOutcome::Stale;
        }
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                warn!(offset = ticket.offset, limit = ticket.limit, "Batch fetch failed: {}", e);
                return FillOutcome::Failed;
            }
        };

        if ticket.is_reset {
            self.slots.clear();
        }
        self.exhausted = records.len() < ticket.limit;
        let count = records.len();
        for (i, sentence) in records.into_iter().enumerate() {
            self.slots.insert(ticket.offset + i, sentence);
        }
        FillOutcome::Merged { count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(offset: usize, n: usize) -> Vec<Sentence> {
        (offset..offset + n)
            .map(|i| Sentence {
                id: i as i64 + 100,
                property_id: 1,
                text: format!("sentence {}", i),
                label_count: 0,
            })
            .collect()
    }

    #[test]
    fn test_window_alignment() {
        let buffer = SparseBuffer::new(10);
        assert_eq!(buffer.window_for(0), 0);
        assert_eq!(buffer.window_for(9), 0);
        assert_eq!(buffer.window_for(12), 10);
        assert_eq!(buffer.window_for(25), 20);
    }

    #[test]
    fn test_fetch_merges_by_absolute_offset() {
        let mut buffer = SparseBuffer::new(10);
        let ticket = buffer.begin_fetch(12).unwrap();
        assert_eq!((ticket.offset, ticket.limit), (10, 10));

        let outcome = buffer.complete(ticket, Ok(sentences(10, 10)));
        assert_eq!(outcome, FillOutcome::Merged { count: 10 });
        assert_eq!(buffer.get(12).unwrap().id, 112);
        assert!(!buffer.contains(9));
        assert!(!buffer.contains(20));
        assert!(!buffer.is_exhausted());
    }

    #[test]
    fn test_single_fetch_in_flight() {
        let mut buffer = SparseBuffer::new(10);
        let first = buffer.begin_fetch(0).unwrap();
        assert!(buffer.begin_fetch(15).is_none());
        buffer.complete(first, Ok(sentences(0, 10)));
        assert!(buffer.begin_fetch(15).is_some());
    }

    #[test]
    fn test_loaded_position_needs_no_fetch() {
        let mut buffer = SparseBuffer::new(10);
        let ticket = buffer.begin_fetch(0).unwrap();
        buffer.complete(ticket, Ok(sentences(0, 10)));
        assert!(buffer.begin_fetch(5).is_none());
    }

    #[test]
    fn test_short_batch_marks_exhausted() {
        let mut buffer = SparseBuffer::new(10);
        let ticket = buffer.begin_fetch(20).unwrap();
        buffer.complete(ticket, Ok(sentences(20, 5)));
        assert!(buffer.is_exhausted());
        assert_eq!(buffer.loaded_count(), 5);
    }

    #[test]
    fn test_stale_generation_dropped() {
        let mut buffer = SparseBuffer::new(10);
        let old = buffer.begin_fetch(30).unwrap();
        let reset = buffer.reset();

        assert_eq!(buffer.complete(old, Ok(sentences(30, 10))), FillOutcome::Stale);
        assert!(!buffer.contains(30));
        // The reset fetch is still pending and unaffected
        assert!(buffer.is_fetching());

        let outcome = buffer.complete(reset, Ok(sentences(0, 3)));
        assert_eq!(outcome, FillOutcome::Merged { count: 3 });
        assert!(!buffer.is_fetching());
    }

    #[test]
    fn test_reset_bypasses_in_flight_guard() {
        let mut buffer = SparseBuffer::new(10);
        buffer.begin_fetch(40).unwrap();
        let reset = buffer.reset();
        assert!(reset.is_reset);
        assert_eq!(reset.offset, 0);
        assert_eq!(reset.generation, 1);
    }

    #[test]
    fn test_reset_replaces_buffer_wholesale() {
        let mut buffer = SparseBuffer::new(10);
        let first = buffer.begin_fetch(10).unwrap();
        buffer.complete(first, Ok(sentences(10, 10)));
        let reset = buffer.reset();
        assert_eq!(buffer.loaded_count(), 0);
        buffer.complete(reset, Ok(sentences(0, 10)));
        assert!(buffer.contains(0));
        assert!(!buffer.contains(10));
    }

    #[test]
    fn test_failure_leaves_slot_empty_for_retry() {
        let mut buffer = SparseBuffer::new(10);
        let ticket = buffer.begin_fetch(3).unwrap();
        let outcome = buffer.complete(ticket, Err(StoreError::Timeout));
        assert_eq!(outcome, FillOutcome::Failed);
        assert!(!buffer.contains(3));
        assert_eq!(buffer.begin_fetch(3), Some(ticket));
    }

    #[test]
    fn test_out_of_order_responses() {
        let mut buffer = SparseBuffer::new(5);
        let a = buffer.begin_fetch(0).unwrap();
        buffer.complete(a, Ok(sentences(0, 5)));
        let b = buffer.begin_fetch(12).unwrap();
        // A late duplicate of the first window arrives after the second started
        buffer.complete(a, Ok(sentences(0, 5)));
        assert!(buffer.is_fetching());
        buffer.complete(b, Ok(sentences(10, 5)));
        assert_eq!(buffer.get(12).unwrap().id, 112);
        assert_eq!(buffer.get(4).unwrap().id, 104);
    }
}
