//! # Flat Index (Brute-Force Exact Search)
//!
//! Searches everything. At tens of thousands of records an exhaustive scan
//! is cheaper than maintaining a graph, and it gives 100% recall.
//!
//! ## Architecture
//! - Borrows a [`CandidateSource`]; owns no vectors itself
//! - Search: O(n) distance calculations, keep top-K in a bounded heap

use vecstash_core::error::{Error, Result};
use vecstash_core::DistanceMetric;

use crate::distance::{PreparedQuery, TopK};
use crate::traits::{CandidateSource, SearchResult, VectorIndex};

/// Flat index for exact nearest neighbor search
pub struct FlatIndex<'a, S: CandidateSource + ?Sized> {
    source: &'a S,
    metric: DistanceMetric,
}

impl<'a, S: CandidateSource + ?Sized> FlatIndex<'a, S> {
    pub fn new(source: &'a S, metric: DistanceMetric) -> Self {
        Self { source, metric }
    }
}

impl<'a, S: CandidateSource + ?Sized> VectorIndex for FlatIndex<'a, S> {
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn dimension(&self) -> usize {
        self.source.dimension()
    }

    fn len(&self) -> usize {
        self.source.candidate_count()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let dimension = self.source.dimension();
        if query.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.source.candidate_count() == 0 {
            return Ok(Vec::new());
        }

        let prepared = PreparedQuery::new(query, self.metric);
        let mut top = TopK::new(k);
        self.source
            .for_each_candidate(&mut |id, vector| top.push(id, prepared.distance(vector)))?;

        Ok(top.into_sorted_vec())
    }
}
