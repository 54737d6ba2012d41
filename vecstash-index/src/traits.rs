//! # Vector Index Traits
//!
//! The seam between the store and whatever structure answers nearest-neighbour
//! queries. The store exposes its records as a [`CandidateSource`]; an index
//! turns a source into ranked [`SearchResult`]s. The exhaustive [`FlatIndex`]
//! is the only implementation today.
//!
//! [`FlatIndex`]: crate::flat::FlatIndex

use std::cmp::Ordering;

use vecstash_core::error::Result;
use vecstash_core::{DistanceMetric, RecordId};

/// Search result with ID and distance
#[derive(Debug, Clone, Copy)]
pub struct SearchResult {
    pub id: RecordId,
    pub distance: f32,
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchResult {}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smaller distance first, then smaller id. total_cmp keeps the order
        // total even if a NaN ever slipped through.
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Anything that can stream `(id, vector)` pairs for scoring.
pub trait CandidateSource {
    /// Dimension of every vector produced
    fn dimension(&self) -> usize;

    /// Number of candidates a full scan visits
    fn candidate_count(&self) -> usize;

    /// Visit every candidate once. The slice is only valid during the call.
    fn for_each_candidate(&self, visit: &mut dyn FnMut(RecordId, &[f32])) -> Result<()>;
}

/// Vector index trait
pub trait VectorIndex {
    /// Metric the index ranks by
    fn metric(&self) -> DistanceMetric;

    /// Vector dimension
    fn dimension(&self) -> usize;

    /// Number of vectors reachable by a search
    fn len(&self) -> usize;

    /// Check if empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Search for k nearest neighbors, closest first
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;
}
