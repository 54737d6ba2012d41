//! Distance engine tests: kernel agreement, metric laws, ranking order

use proptest::prelude::*;
use rand::Rng;
use vecstash_core::RecordId;
use vecstash_index::{
    cosine_similarity, dot_product, l2_distance, normalize, rank, score, CandidateSource,
    DistanceMetric, FlatIndex, SearchResult, VectorIndex, MAX_DISTANCE,
};

fn random_vec(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn scalar_cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    (1.0 - dot / (na * nb)).max(0.0)
}

struct Rows {
    dimension: usize,
    rows: Vec<(RecordId, Vec<f32>)>,
}

impl CandidateSource for Rows {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn candidate_count(&self) -> usize {
        self.rows.len()
    }

    fn for_each_candidate(
        &self,
        visit: &mut dyn FnMut(RecordId, &[f32]),
    ) -> vecstash_core::Result<()> {
        for (id, v) in &self.rows {
            visit(*id, v);
        }
        Ok(())
    }
}

// ============================================================================
// Kernel tests
// ============================================================================

#[test]
fn test_dot_product_correctness() {
    let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
    let b = vec![8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
    let expected: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    assert!((dot_product(&a, &b) - expected).abs() < 1e-5);
}

#[test]
fn test_l2_distance_correctness() {
    let a = vec![1.0, 2.0, 3.0];
    let b = vec![4.0, 5.0, 6.0];
    let expected = ((3.0f32).powi(2) * 3.0).sqrt();
    assert!((l2_distance(&a, &b) - expected).abs() < 1e-5);
}

#[test]
fn test_cosine_matches_scalar_at_embedding_dims() {
    for dim in [384, 1024] {
        let a = random_vec(dim);
        let b = random_vec(dim);
        let expected = scalar_cosine_distance(&a, &b);
        let actual = score(&a, &b, DistanceMetric::Cosine);
        assert!((actual - expected).abs() < 1e-4, "dim {}: {} vs {}", dim, actual, expected);
    }
}

#[test]
fn test_cosine_of_normalized_equals_one_minus_dot() {
    let mut a = random_vec(384);
    let mut b = random_vec(384);
    normalize(&mut a);
    normalize(&mut b);
    let d = score(&a, &b, DistanceMetric::Cosine);
    assert!((d - (1.0 - dot_product(&a, &b))).abs() < 1e-4);
    assert!((cosine_similarity(&a, &b) - dot_product(&a, &b)).abs() < 1e-4);
}

// ============================================================================
// Metric laws
// ============================================================================

#[test]
fn test_identity_distances() {
    let v = random_vec(64);
    assert_eq!(score(&v, &v, DistanceMetric::Cosine), 0.0);
    assert_eq!(score(&v, &v, DistanceMetric::Euclidean), 0.0);
    let neg = score(&v, &v, DistanceMetric::NegativeInnerProduct);
    assert!((neg + dot_product(&v, &v)).abs() < 1e-4);
}

#[test]
fn test_cosine_self_distance_is_exactly_zero() {
    for dim in [3, 17, 384, 1024] {
        for _ in 0..100 {
            let v = random_vec(dim);
            assert_eq!(score(&v, &v, DistanceMetric::Cosine), 0.0, "dim {}", dim);
            assert_eq!(cosine_similarity(&v, &v), 1.0, "dim {}", dim);
        }
    }
}

#[test]
fn test_exact_match_outranks_near_duplicate() {
    let query = random_vec(384);
    let mut near = query.clone();
    near[0] += 0.5;
    let source = Rows {
        dimension: 384,
        rows: vec![(RecordId(1), near), (RecordId(2), query.clone())],
    };
    let results = FlatIndex::new(&source, DistanceMetric::Cosine).search(&query, 2).unwrap();
    assert_eq!(results[0].id, RecordId(2));
    assert_eq!(results[0].distance, 0.0);
}

#[test]
fn test_zero_vector_ranks_last_under_cosine() {
    let query = vec![1.0, 0.0];
    let source = Rows {
        dimension: 2,
        rows: vec![
            (RecordId(1), vec![0.0, 0.0]),
            (RecordId(2), vec![-1.0, 0.0]),
        ],
    };
    let results = FlatIndex::new(&source, DistanceMetric::Cosine).search(&query, 2).unwrap();
    assert_eq!(results[0].id, RecordId(2));
    assert_eq!(results[1].id, RecordId(1));
    assert_eq!(results[1].distance, MAX_DISTANCE);
}

// ============================================================================
// Ranking
// ============================================================================

#[test]
fn test_rank_k_larger_than_candidates() {
    let a = vec![1.0f32, 0.0];
    let b = vec![0.0f32, 1.0];
    let results = rank(
        &a,
        vec![(RecordId(1), &a[..]), (RecordId(2), &b[..])],
        DistanceMetric::Cosine,
        10,
    );
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, RecordId(1));
}

#[test]
fn test_rank_empty_candidates() {
    let q = vec![1.0f32, 0.0];
    let results = rank(&q, Vec::<(RecordId, &[f32])>::new(), DistanceMetric::Cosine, 5);
    assert!(results.is_empty());
}

#[test]
fn test_flat_search_identical_vectors_ordered_by_id() {
    let v = vec![0.5f32, 0.5, 0.5];
    let source = Rows {
        dimension: 3,
        rows: (1..=6).rev().map(|i| (RecordId(i), v.clone())).collect(),
    };
    let results = FlatIndex::new(&source, DistanceMetric::Cosine).search(&v, 4).unwrap();
    let ids: Vec<u64> = results.iter().map(|r| r.id.value()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

fn oracle(query: &[f32], rows: &[(RecordId, Vec<f32>)], metric: DistanceMetric, k: usize) -> Vec<SearchResult> {
    let mut all: Vec<SearchResult> = rows
        .iter()
        .map(|(id, v)| SearchResult { id: *id, distance: score(query, v, metric) })
        .collect();
    all.sort();
    all.truncate(k);
    all
}

fn metric_strategy() -> impl Strategy<Value = DistanceMetric> {
    prop_oneof![
        Just(DistanceMetric::Cosine),
        Just(DistanceMetric::NegativeInnerProduct),
        Just(DistanceMetric::Euclidean),
    ]
}

proptest! {
    #[test]
    fn prop_rank_matches_full_sort(
        rows in prop::collection::vec(prop::collection::vec(-4.0f32..4.0, 8), 0..40),
        query in prop::collection::vec(-4.0f32..4.0, 8),
        k in 0usize..12,
        metric in metric_strategy(),
    ) {
        let rows: Vec<(RecordId, Vec<f32>)> = rows
            .into_iter()
            .enumerate()
            .map(|(i, v)| (RecordId(i as u64 + 1), v))
            .collect();

        let ranked = rank(&query, rows.iter().map(|(id, v)| (*id, v.as_slice())), metric, k);
        let expected = oracle(&query, &rows, metric, k);

        prop_assert_eq!(ranked.len(), expected.len());
        for (got, want) in ranked.iter().zip(expected.iter()) {
            prop_assert_eq!(got.id, want.id);
            prop_assert_eq!(got.distance.to_bits(), want.distance.to_bits());
        }
        for pair in ranked.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
    }
}
