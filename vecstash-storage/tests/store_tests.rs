//! # Store Tests
//!
//! Insert, query, delete and lifecycle behaviour of in-memory stores.

use rand::Rng;
use vecstash_core::{DistanceMetric, Error, Placement, RecordId, StoreConfig};
use vecstash_storage::{encode_embedding, Store};

fn random_vec(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn store(dimension: usize, metric: DistanceMetric) -> Store {
    Store::create(StoreConfig::new(dimension, metric, 2048)).unwrap()
}

// ============================================================================
// End-to-End
// ============================================================================

#[test]
fn test_cat_dog_rocket() {
    let store = store(3, DistanceMetric::Cosine);
    store.insert("cat", vec![1.0, 0.0, 0.0]).unwrap();
    store.insert("dog", vec![0.9, 0.1, 0.0]).unwrap();
    store.insert("rocket", vec![0.0, 0.0, 1.0]).unwrap();

    let hits = store.query(&[1.0, 0.0, 0.0], 2).unwrap();
    let contents: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
    assert_eq!(contents, vec!["cat", "dog"]);
    assert_eq!(hits[0].distance, 0.0);
    assert!(hits[1].distance > 0.0);
}

#[test]
fn test_exact_vector_ranks_first_for_every_metric() {
    for metric in [
        DistanceMetric::Cosine,
        DistanceMetric::NegativeInnerProduct,
        DistanceMetric::Euclidean,
    ] {
        let store = store(16, metric);
        // Unit vectors keep negative inner product's identity the minimum.
        let vectors: Vec<Vec<f32>> = (0..50)
            .map(|_| {
                let mut v = random_vec(16);
                vecstash_index::normalize(&mut v);
                v
            })
            .collect();
        let ids = store
            .insert_batch(vectors.iter().enumerate().map(|(i, v)| (format!("doc {}", i), v.clone())))
            .unwrap();

        for (id, v) in ids.iter().zip(&vectors).step_by(7) {
            let hits = store.query(v, 1).unwrap();
            assert_eq!(hits[0].id, *id, "metric {}", metric);
            match metric {
                DistanceMetric::Cosine => assert_eq!(hits[0].distance, 0.0),
                DistanceMetric::Euclidean => assert_eq!(hits[0].distance, 0.0),
                DistanceMetric::NegativeInnerProduct => assert!((hits[0].distance + 1.0).abs() < 1e-4),
            }
        }
    }
}

#[test]
fn test_cosine_self_query_distance_is_exactly_zero() {
    let store = store(384, DistanceMetric::Cosine);
    let vectors: Vec<Vec<f32>> = (0..200).map(|_| random_vec(384)).collect();
    let ids = store
        .insert_batch(vectors.iter().enumerate().map(|(i, v)| (format!("doc {}", i), v.clone())))
        .unwrap();

    for (id, v) in ids.iter().zip(&vectors) {
        let hits = store.query(v, 1).unwrap();
        assert_eq!(hits[0].id, *id);
        assert_eq!(hits[0].distance, 0.0, "record {}", id);
    }
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_dimension_mismatch_leaves_store_untouched() {
    let store = store(3, DistanceMetric::Cosine);
    store.insert("a", vec![1.0, 0.0, 0.0]).unwrap();

    let err = store.insert("b", vec![1.0, 0.0]).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));

    let err = store
        .insert_batch(vec![("c", vec![0.0, 1.0, 0.0]), ("d", vec![0.0; 4])])
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 4 }));

    let err = store.query(&[1.0, 0.0], 1).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));

    assert_eq!(store.len(), 1);
    assert_eq!(store.insert("e", vec![0.0, 0.0, 1.0]).unwrap(), RecordId(2));
}

#[test]
fn test_non_finite_embedding_rejected() {
    let store = store(2, DistanceMetric::Cosine);
    let err = store.insert("nan", vec![f32::NAN, 0.0]).unwrap_err();
    assert!(matches!(err, Error::InvalidEmbedding { index: 0 }));
    assert!(store.is_empty());
}

#[test]
fn test_empty_content_rejected_by_default() {
    let store = store(2, DistanceMetric::Cosine);
    assert!(matches!(
        store.insert("", vec![1.0, 0.0]),
        Err(Error::InvalidRecord { .. })
    ));
}

// ============================================================================
// Query Semantics
// ============================================================================

#[test]
fn test_query_k_zero_and_empty_store() {
    let store = store(2, DistanceMetric::Cosine);
    assert!(store.query(&[1.0, 0.0], 5).unwrap().is_empty());
    store.insert("a", vec![1.0, 0.0]).unwrap();
    assert!(store.query(&[1.0, 0.0], 0).unwrap().is_empty());
}

#[test]
fn test_k_larger_than_store_returns_all() {
    let store = store(2, DistanceMetric::Euclidean);
    store.insert("a", vec![1.0, 0.0]).unwrap();
    store.insert("b", vec![0.0, 1.0]).unwrap();
    let hits = store.query(&[1.0, 0.0], 10).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].distance <= hits[1].distance);
}

#[test]
fn test_ties_ordered_by_id_reproducibly() {
    let store = store(2, DistanceMetric::Cosine);
    for i in 0..5 {
        store.insert(format!("twin {}", i), vec![0.6, 0.8]).unwrap();
    }
    let first = store.query(&[0.6, 0.8], 3).unwrap();
    let ids: Vec<u64> = first.iter().map(|h| h.id.value()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    for _ in 0..5 {
        assert_eq!(store.query(&[0.6, 0.8], 3).unwrap(), first);
    }
}

#[test]
fn test_zero_vector_ranks_last() {
    let store = store(2, DistanceMetric::Cosine);
    let zero = store.insert("zero", vec![0.0, 0.0]).unwrap();
    store.insert("opposite", vec![-1.0, 0.0]).unwrap();
    let hits = store.query(&[1.0, 0.0], 2).unwrap();
    assert_eq!(hits[1].id, zero);
    assert_eq!(hits[1].distance, f32::MAX);
}

// ============================================================================
// Placement
// ============================================================================

#[test]
fn test_threshold_exact_placement_and_byte_identity() {
    // 384 dims = 1536 bytes, 1024 dims = 4096 bytes, threshold 2048.
    for (dim, inline) in [(384usize, true), (1024usize, false)] {
        let store = store(dim, DistanceMetric::Cosine);
        let v = random_vec(dim);
        let id = store.insert("doc", v.clone()).unwrap();

        let record = store.get(id).unwrap();
        assert_eq!(record.placement().is_inline(), inline, "dim {}", dim);
        assert_eq!(encode_embedding(record.embedding()), encode_embedding(&v));

        let stats = store.stats();
        assert_eq!(stats.inline_records, usize::from(inline));
        assert_eq!(stats.overflow_records, usize::from(!inline));
    }
}

#[test]
fn test_mixed_sizes_under_custom_threshold() {
    let config = StoreConfig::new(8, DistanceMetric::Cosine, 32);
    let store = Store::create(config).unwrap();
    let id = store.insert("exactly at threshold", vec![1.0; 8]).unwrap();
    assert_eq!(store.get(id).unwrap().placement(), Placement::Inline);

    let config = StoreConfig::new(9, DistanceMetric::Cosine, 32);
    let store = Store::create(config).unwrap();
    let id = store.insert("one element over", vec![1.0; 9]).unwrap();
    assert!(matches!(store.get(id).unwrap().placement(), Placement::Overflow(_)));
}

// ============================================================================
// Delete
// ============================================================================

#[test]
fn test_delete_removes_from_results() {
    let store = store(3, DistanceMetric::Cosine);
    let cat = store.insert("cat", vec![1.0, 0.0, 0.0]).unwrap();
    store.insert("dog", vec![0.9, 0.1, 0.0]).unwrap();

    store.delete(cat).unwrap();
    let hits = store.query(&[1.0, 0.0, 0.0], 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "dog");
    assert!(matches!(store.get(cat), Err(Error::NotFound { .. })));
    assert!(matches!(store.delete(cat), Err(Error::NotFound { .. })));
}

#[test]
fn test_delete_frees_overflow_space() {
    let mut config = StoreConfig::new(1024, DistanceMetric::Cosine, 2048);
    config.placement.segment_capacity = 4096 * 4;
    let store = Store::create(config).unwrap();

    let ids = store
        .insert_batch((0..4).map(|i| (format!("big {}", i), random_vec(1024))))
        .unwrap();
    assert_eq!(store.stats().segments.len(), 1);
    assert_eq!(store.stats().overflow_live_bytes, 4 * 4096);

    store.delete(ids[0]).unwrap();
    store.delete(ids[1]).unwrap();
    store.delete(ids[2]).unwrap();
    let stats = store.stats();
    assert_eq!(stats.overflow_live_bytes, 4096);
    assert_eq!(stats.segments[0].physical_bytes, 4096);
    assert!(store.metrics().segments_compacted >= 1);

    // Survivor still reads back after compaction.
    assert_eq!(store.get(ids[3]).unwrap().dimension(), 1024);

    store.delete(ids[3]).unwrap();
    assert!(store.stats().segments.is_empty());
    assert_eq!(store.metrics().segments_released, 1);
}

#[test]
fn test_ids_never_reused_after_delete() {
    let store = store(2, DistanceMetric::Cosine);
    let a = store.insert("a", vec![1.0, 0.0]).unwrap();
    store.delete(a).unwrap();
    assert_eq!(store.insert("b", vec![0.0, 1.0]).unwrap(), RecordId(2));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_closed_store_rejects_operations() {
    let store = store(2, DistanceMetric::Cosine);
    let id = store.insert("a", vec![1.0, 0.0]).unwrap();
    store.close().unwrap();

    assert!(matches!(store.insert("b", vec![0.0, 1.0]), Err(Error::StoreClosed)));
    assert!(matches!(store.query(&[1.0, 0.0], 1), Err(Error::StoreClosed)));
    assert!(matches!(store.delete(id), Err(Error::StoreClosed)));
    assert!(matches!(store.get(id), Err(Error::StoreClosed)));
}

#[test]
fn test_metrics_track_operations() {
    let store = store(2, DistanceMetric::Cosine);
    store
        .insert_batch(vec![("a", vec![1.0, 0.0]), ("b", vec![0.0, 1.0])])
        .unwrap();
    store.query(&[1.0, 0.0], 1).unwrap();
    let m = store.metrics();
    assert_eq!(m.records_inserted, 2);
    assert_eq!(m.batches_committed, 1);
    assert_eq!(m.queries_executed, 1);
    assert_eq!(m.candidates_scored, 2);
}

#[test]
fn test_returned_record_is_a_copy() {
    let store = store(2, DistanceMetric::Cosine);
    let id = store.insert("a", vec![1.0, 0.0]).unwrap();
    let record = store.get(id).unwrap();
    drop(record);
    assert_eq!(store.get(id).unwrap().content(), "a");
}
