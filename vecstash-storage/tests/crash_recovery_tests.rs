//! # Crash Recovery Tests
//!
//! Tests for:
//! - Journal replay after a crash
//! - Torn batches (all-or-nothing visibility)
//! - Checkpoint snapshots and reopen
//! - Id continuity across restarts

use std::fs::OpenOptions;
use std::path::Path;

use rand::Rng;
use tempfile::TempDir;

use vecstash_core::{DistanceMetric, Error, RecordId, StoreConfig};
use vecstash_storage::journal::JOURNAL_FILE_NAME;
use vecstash_storage::{encode_embedding, Store};

fn random_vec(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn config(dir: &Path, dimension: usize) -> StoreConfig {
    StoreConfig::new(dimension, DistanceMetric::Cosine, 2048).with_data_dir(dir)
}

fn journal_len(dir: &Path) -> u64 {
    std::fs::metadata(dir.join(JOURNAL_FILE_NAME)).unwrap().len()
}

fn truncate_journal(dir: &Path, len: u64) {
    let f = OpenOptions::new()
        .write(true)
        .open(dir.join(JOURNAL_FILE_NAME))
        .unwrap();
    f.set_len(len).unwrap();
}

// =============================================================================
// Journal Replay
// =============================================================================

#[test]
fn test_oversized_record_rejected_without_losing_later_writes() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(config(tmp.path(), 4)).unwrap();
        assert_eq!(store.insert("a", random_vec(4)).unwrap(), RecordId(1));

        let huge = String::from_utf8(vec![0u8; vecstash_storage::record::MAX_RECORD_BYTES]).unwrap();
        let err = store.insert(huge, random_vec(4)).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));

        assert_eq!(store.insert("c", random_vec(4)).unwrap(), RecordId(2));
        assert_eq!(store.len(), 2);
        store.close().unwrap();
    }

    let store = Store::open(config(tmp.path(), 4)).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.get(RecordId(1)).unwrap().content(), "a");
    assert_eq!(store.get(RecordId(2)).unwrap().content(), "c");
}

#[test]
fn test_recovery_from_journal_only() {
    let tmp = TempDir::new().unwrap();
    let vectors: Vec<Vec<f32>> = (0..20).map(|_| random_vec(8)).collect();

    // Session 1: write, then drop without checkpoint or close
    let ids = {
        let store = Store::open(config(tmp.path(), 8)).unwrap();
        store
            .insert_batch(vectors.iter().enumerate().map(|(i, v)| (format!("doc {}", i), v.clone())))
            .unwrap()
    };

    // Session 2: everything is back
    let store = Store::open(config(tmp.path(), 8)).unwrap();
    assert_eq!(store.len(), 20);
    for (id, v) in ids.iter().zip(&vectors) {
        let record = store.get(*id).unwrap();
        assert_eq!(encode_embedding(record.embedding()), encode_embedding(v));
    }
}

#[test]
fn test_torn_batch_is_invisible() {
    let tmp = TempDir::new().unwrap();

    let committed_len = {
        let store = Store::open(config(tmp.path(), 4)).unwrap();
        store
            .insert_batch(vec![("a", vec![1.0, 0.0, 0.0, 0.0]), ("b", vec![0.0, 1.0, 0.0, 0.0])])
            .unwrap();
        let committed_len = journal_len(tmp.path());
        store
            .insert_batch((0..10).map(|i| (format!("late {}", i), random_vec(4))))
            .unwrap();
        committed_len
    };

    // Simulate a crash part-way through writing the second batch.
    let full_len = journal_len(tmp.path());
    truncate_journal(tmp.path(), committed_len + (full_len - committed_len) / 2);

    let store = Store::open(config(tmp.path(), 4)).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.contains(RecordId(1)));
    assert!(store.contains(RecordId(2)));
    assert!(!store.contains(RecordId(3)));

    // The torn batch's ids were never durable, so they are handed out again.
    assert_eq!(store.insert("c", vec![0.0, 0.0, 1.0, 0.0]).unwrap(), RecordId(3));
}

#[test]
fn test_missing_commit_marker_drops_whole_batch() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(config(tmp.path(), 4)).unwrap();
        store.insert("a", vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        store
            .insert_batch((0..5).map(|i| (format!("b{}", i), random_vec(4))))
            .unwrap();
    }
    // Commit marker: 32-byte entry header plus a 4-byte count.
    let len = journal_len(tmp.path());
    truncate_journal(tmp.path(), len - 36);

    let store = Store::open(config(tmp.path(), 4)).unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn test_deletes_replay() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(config(tmp.path(), 1024)).unwrap();
        let ids = store
            .insert_batch((0..3).map(|i| (format!("big {}", i), random_vec(1024))))
            .unwrap();
        store.delete(ids[1]).unwrap();
    }
    let store = Store::open(config(tmp.path(), 1024)).unwrap();
    assert_eq!(store.len(), 2);
    assert!(!store.contains(RecordId(2)));
    assert_eq!(store.stats().overflow_records, 2);
}

// =============================================================================
// Checkpoints
// =============================================================================

#[test]
fn test_checkpoint_and_reopen_both_placements() {
    // 384 dims stay inline, 1024 dims overflow.
    for (dim, inline) in [(384usize, true), (1024usize, false)] {
        let tmp = TempDir::new().unwrap();
        let v = random_vec(dim);

        let id = {
            let store = Store::open(config(tmp.path(), dim)).unwrap();
            let id = store.insert("doc", v.clone()).unwrap();
            store.checkpoint().unwrap();
            store.close().unwrap();
            id
        };

        let store = Store::open(config(tmp.path(), dim)).unwrap();
        let record = store.get(id).unwrap();
        assert_eq!(record.placement().is_inline(), inline, "dim {}", dim);
        assert_eq!(encode_embedding(record.embedding()), encode_embedding(&v));
        assert_eq!(store.query(&v, 1).unwrap()[0].id, id);
    }
}

#[test]
fn test_checkpoint_then_more_writes() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(config(tmp.path(), 8)).unwrap();
        store
            .insert_batch((0..10).map(|i| (format!("before {}", i), random_vec(8))))
            .unwrap();
        assert_eq!(store.checkpoint().unwrap(), 1);
        let journal_after_checkpoint = store.stats().journal_bytes;
        store
            .insert_batch((0..5).map(|i| (format!("after {}", i), random_vec(8))))
            .unwrap();
        store.delete(RecordId(1)).unwrap();
        assert!(store.stats().journal_bytes > journal_after_checkpoint);
    }

    let store = Store::open(config(tmp.path(), 8)).unwrap();
    assert_eq!(store.len(), 14);
    assert!(!store.contains(RecordId(1)));
    assert!(store.contains(RecordId(15)));

    // Second checkpoint replaces the first generation.
    assert_eq!(store.checkpoint().unwrap(), 2);
    assert!(!tmp.path().join("snapshot-00000001").exists());
    assert!(tmp.path().join("snapshot-00000002").exists());
}

#[test]
fn test_ids_continue_past_deleted_max_after_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(config(tmp.path(), 2)).unwrap();
        store.insert("a", vec![1.0, 0.0]).unwrap();
        let b = store.insert("b", vec![0.0, 1.0]).unwrap();
        store.checkpoint().unwrap();
        store.delete(b).unwrap();
        store.checkpoint().unwrap();
    }
    let store = Store::open(config(tmp.path(), 2)).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.insert("c", vec![1.0, 1.0]).unwrap(), RecordId(3));
}

#[test]
fn test_compacted_segment_survives_checkpoint() {
    let tmp = TempDir::new().unwrap();
    let vectors: Vec<Vec<f32>> = (0..4).map(|_| random_vec(1024)).collect();
    {
        let mut cfg = config(tmp.path(), 1024);
        cfg.placement.segment_capacity = 4 * 4096;
        let store = Store::open(cfg).unwrap();
        let ids = store
            .insert_batch(vectors.iter().map(|v| ("big", v.clone())))
            .unwrap();
        for id in &ids[..3] {
            store.delete(*id).unwrap();
        }
        store.checkpoint().unwrap();
    }
    let mut cfg = config(tmp.path(), 1024);
    cfg.placement.segment_capacity = 4 * 4096;
    let store = Store::open(cfg).unwrap();
    let record = store.get(RecordId(4)).unwrap();
    assert_eq!(encode_embedding(record.embedding()), encode_embedding(&vectors[3]));

    // New overflow writes land after the surviving slot.
    let id = store.insert("next", random_vec(1024)).unwrap();
    assert_eq!(id, RecordId(5));
    assert_eq!(store.stats().overflow_live_bytes, 2 * 4096);
}

// =============================================================================
// Configuration Guards
// =============================================================================

#[test]
fn test_reopen_with_different_shape_fails() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(config(tmp.path(), 4)).unwrap();
        store.insert("a", vec![1.0; 4]).unwrap();
        store.checkpoint().unwrap();
    }
    let err = Store::open(config(tmp.path(), 8)).err().unwrap();
    assert!(matches!(err, Error::Configuration { .. }));

    let other_metric = StoreConfig::new(4, DistanceMetric::Euclidean, 2048).with_data_dir(tmp.path());
    assert!(matches!(Store::open(other_metric), Err(Error::Configuration { .. })));
}

#[test]
fn test_create_refuses_existing_store() {
    let tmp = TempDir::new().unwrap();
    drop(Store::create(config(tmp.path(), 4)).unwrap());
    assert!(Store::exists(tmp.path()));
    assert!(matches!(
        Store::create(config(tmp.path(), 4)),
        Err(Error::Configuration { .. })
    ));

    Store::destroy(tmp.path()).unwrap();
    assert!(!Store::exists(tmp.path()));
    assert!(Store::create(config(tmp.path(), 4)).is_ok());
}

#[test]
fn test_destroy_leaves_unrelated_files() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(config(tmp.path(), 4)).unwrap();
        store.insert("a", vec![1.0; 4]).unwrap();
        store.checkpoint().unwrap();
        store.close().unwrap();
    }
    std::fs::write(tmp.path().join("export.tmp"), b"keep").unwrap();
    std::fs::write(tmp.path().join("snapshot-notes.txt"), b"keep").unwrap();
    std::fs::write(tmp.path().join("MANIFEST.json.tmp"), b"{").unwrap();

    // A reopen sweeps only what the store itself left behind.
    drop(Store::open(config(tmp.path(), 4)).unwrap());
    assert!(!tmp.path().join("MANIFEST.json.tmp").exists());
    assert!(tmp.path().join("export.tmp").exists());

    Store::destroy(tmp.path()).unwrap();
    assert!(!Store::exists(tmp.path()));
    assert!(!tmp.path().join("snapshot-00000001").exists());
    assert!(tmp.path().join("export.tmp").exists());
    assert!(tmp.path().join("snapshot-notes.txt").exists());
}
