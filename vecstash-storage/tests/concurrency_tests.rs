//! # Concurrency Tests
//!
//! Readers racing writers must only ever see whole batches, and writers
//! racing each other must never share or skip ids.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use vecstash_core::{DistanceMetric, StoreConfig};
use vecstash_storage::Store;

const BATCH: usize = 10;

fn batch(writer: usize, round: usize, dim: usize) -> Vec<(String, Vec<f32>)> {
    (0..BATCH)
        .map(|i| {
            let mut v = vec![0.0f32; dim];
            v[(writer + i) % dim] = 1.0;
            (format!("w{}-r{}-{}", writer, round, i), v)
        })
        .collect()
}

#[test]
fn test_concurrent_writers_get_disjoint_contiguous_ids() {
    let store = Arc::new(Store::create(StoreConfig::new(16, DistanceMetric::Cosine, 2048)).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut all = Vec::new();
                for round in 0..25 {
                    let ids = store.insert_batch(batch(w, round, 16)).unwrap();
                    // Each batch is a consecutive run.
                    for pair in ids.windows(2) {
                        assert_eq!(pair[1].value(), pair[0].value() + 1);
                    }
                    all.extend(ids);
                }
                all
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "id {} issued twice", id);
        }
    }

    let total = 4 * 25 * BATCH;
    assert_eq!(store.len(), total);
    let max = seen.iter().map(|id| id.value()).max().unwrap();
    assert_eq!(max, total as u64, "ids have gaps");
}

#[test]
fn test_queries_see_whole_batches_only() {
    let tmp = TempDir::new().unwrap();
    let config = StoreConfig::new(8, DistanceMetric::Euclidean, 2048).with_data_dir(tmp.path());
    let store = Arc::new(Store::open(config).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for round in 0..50 {
                store.insert_batch(batch(0, round, 8)).unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let query = vec![0.0f32; 8];
                let mut checks = 0;
                while !done.load(Ordering::Acquire) || checks == 0 {
                    let hits = store.query(&query, usize::MAX).unwrap();
                    assert_eq!(hits.len() % BATCH, 0, "partial batch visible");
                    for hit in &hits {
                        assert!(!hit.content.is_empty());
                    }
                    checks += 1;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.len(), 50 * BATCH);
}

#[test]
fn test_close_during_writes_is_clean() {
    let store = Arc::new(Store::create(StoreConfig::new(4, DistanceMetric::Cosine, 2048)).unwrap());

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let mut committed = 0usize;
            for round in 0..1000 {
                match store.insert_batch(batch(1, round, 4)) {
                    Ok(ids) => committed += ids.len(),
                    Err(vecstash_core::Error::StoreClosed) => break,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            committed
        })
    };

    thread::sleep(std::time::Duration::from_millis(5));
    store.close().unwrap();
    let committed = writer.join().unwrap();

    assert_eq!(committed % BATCH, 0);
    assert_eq!(store.len(), committed);
}
