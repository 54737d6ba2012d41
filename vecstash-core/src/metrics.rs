//! # Metrics and Monitoring
//!
//! Lock-free counters for store activity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector
#[derive(Clone, Default)]
pub struct StoreMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    // Write metrics
    records_inserted: AtomicU64,
    batches_committed: AtomicU64,
    records_deleted: AtomicU64,
    rejected_writes: AtomicU64,

    // Placement metrics
    overflow_bytes_written: AtomicU64,
    segments_compacted: AtomicU64,
    segments_released: AtomicU64,

    // Journal metrics
    journal_writes: AtomicU64,
    journal_bytes: AtomicU64,
    checkpoints: AtomicU64,

    // Query metrics
    queries_executed: AtomicU64,
    candidates_scored: AtomicU64,
}

impl StoreMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed batch of `count` records
    pub fn record_batch(&self, count: u64) {
        self.inner.records_inserted.fetch_add(count, Ordering::Relaxed);
        self.inner.batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.inner.records_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write rejected before any mutation
    pub fn record_rejected_write(&self) {
        self.inner.rejected_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow_write(&self, bytes: u64) {
        self.inner.overflow_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_compaction(&self) {
        self.inner.segments_compacted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segment_release(&self) {
        self.inner.segments_released.fetch_add(1, Ordering::Relaxed);
    }

    /// Record journal append
    pub fn record_journal_write(&self, bytes: u64) {
        self.inner.journal_writes.fetch_add(1, Ordering::Relaxed);
        self.inner.journal_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_checkpoint(&self) {
        self.inner.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    /// Record query execution over `candidates` records
    pub fn record_query(&self, candidates: u64) {
        self.inner.queries_executed.fetch_add(1, Ordering::Relaxed);
        self.inner.candidates_scored.fetch_add(candidates, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            records_inserted: inner.records_inserted.load(Ordering::Relaxed),
            batches_committed: inner.batches_committed.load(Ordering::Relaxed),
            records_deleted: inner.records_deleted.load(Ordering::Relaxed),
            rejected_writes: inner.rejected_writes.load(Ordering::Relaxed),
            overflow_bytes_written: inner.overflow_bytes_written.load(Ordering::Relaxed),
            segments_compacted: inner.segments_compacted.load(Ordering::Relaxed),
            segments_released: inner.segments_released.load(Ordering::Relaxed),
            journal_writes: inner.journal_writes.load(Ordering::Relaxed),
            journal_bytes: inner.journal_bytes.load(Ordering::Relaxed),
            checkpoints: inner.checkpoints.load(Ordering::Relaxed),
            queries_executed: inner.queries_executed.load(Ordering::Relaxed),
            candidates_scored: inner.candidates_scored.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_inserted: u64,
    pub batches_committed: u64,
    pub records_deleted: u64,
    pub rejected_writes: u64,
    pub overflow_bytes_written: u64,
    pub segments_compacted: u64,
    pub segments_released: u64,
    pub journal_writes: u64,
    pub journal_bytes: u64,
    pub checkpoints: u64,
    pub queries_executed: u64,
    pub candidates_scored: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    /// Start new timer
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer and log duration
    pub fn stop(self) -> Duration {
        let duration = self.elapsed();
        tracing::debug!(
            name = self.name,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
        duration
    }
}
