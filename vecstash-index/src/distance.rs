//! # Distance Engine
//!
//! Pairwise scoring and exhaustive top-k ranking. All metrics follow the
//! "lower is closer" convention of the `<=>` operator family, so one ordering
//! serves every metric.
//!
//! | metric                 | distance                      | identity |
//! |------------------------|-------------------------------|----------|
//! | cosine                 | `1 - dot / (‖a‖·‖b‖)`         | 0        |
//! | negative inner product | `-dot(a, b)`                  | `-‖a‖²`  |
//! | euclidean              | `sqrt(Σ (a_i - b_i)²)`        | 0        |
//!
//! A zero-norm vector has no direction; its cosine distance to anything is
//! `f32::MAX` so it always ranks last.

use std::collections::BinaryHeap;

use vecstash_core::{DistanceMetric, RecordId};

use crate::simd::{dot_and_norm_squared, dot_product, l2_distance_squared};
use crate::traits::SearchResult;

/// Distance reported for cosine comparisons involving a zero vector.
pub const MAX_DISTANCE: f32 = f32::MAX;

/// Score two vectors of equal, pre-validated dimension.
#[inline]
pub fn score(a: &[f32], b: &[f32], metric: DistanceMetric) -> f32 {
    PreparedQuery::new(a, metric).distance(b)
}

/// Cosine similarity in `[-1, 1]`, `0.0` when either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let distance = score(a, b, DistanceMetric::Cosine);
    if distance == MAX_DISTANCE {
        0.0
    } else {
        1.0 - distance
    }
}

/// A query vector with its per-query constants precomputed.
#[derive(Debug, Clone)]
pub struct PreparedQuery<'q> {
    query: &'q [f32],
    metric: DistanceMetric,
    /// Squared query norm, from the same kernel that scores candidates.
    query_norm_sq: f32,
}

impl<'q> PreparedQuery<'q> {
    pub fn new(query: &'q [f32], metric: DistanceMetric) -> Self {
        let query_norm_sq = match metric {
            DistanceMetric::Cosine => dot_and_norm_squared(query, query).1,
            _ => 0.0,
        };
        Self { query, metric, query_norm_sq }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn dimension(&self) -> usize {
        self.query.len()
    }

    /// Distance from the query to `candidate`.
    #[inline]
    pub fn distance(&self, candidate: &[f32]) -> f32 {
        debug_assert_eq!(self.query.len(), candidate.len());
        match self.metric {
            DistanceMetric::Cosine => {
                let (dot, candidate_sq) = dot_and_norm_squared(self.query, candidate);
                // The product of two f32 squares is exact in f64, so a vector
                // scored against itself lands on exactly 0.
                let denom = (f64::from(self.query_norm_sq) * f64::from(candidate_sq)).sqrt();
                if denom > 0.0 && denom.is_finite() {
                    (1.0 - f64::from(dot) / denom).max(0.0) as f32
                } else {
                    MAX_DISTANCE
                }
            }
            DistanceMetric::NegativeInnerProduct => -dot_product(self.query, candidate),
            DistanceMetric::Euclidean => l2_distance_squared(self.query, candidate).sqrt(),
        }
    }
}

/// Bounded collector that keeps the `k` best results seen so far.
///
/// A max-heap keyed on `(distance, id)`: the current worst result sits on top
/// and is evicted first, so among equal distances the larger id goes.
pub struct TopK {
    k: usize,
    heap: BinaryHeap<SearchResult>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
        }
    }

    #[inline]
    pub fn push(&mut self, id: RecordId, distance: f32) {
        if self.k == 0 {
            return;
        }
        let candidate = SearchResult { id, distance };
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Ascending distance, ties by ascending id.
    pub fn into_sorted_vec(self) -> Vec<SearchResult> {
        self.heap.into_sorted_vec()
    }
}

/// Score every candidate and return the `k` closest.
///
/// Runs in O(n·D): every candidate is compared, because a candidate seen late
/// can still displace the current best.
pub fn rank<'a, I>(query: &[f32], candidates: I, metric: DistanceMetric, k: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = (RecordId, &'a [f32])>,
{
    let prepared = PreparedQuery::new(query, metric);
    let mut top = TopK::new(k);
    for (id, vector) in candidates {
        top.push(id, prepared.distance(vector));
    }
    top.into_sorted_vec()
}
