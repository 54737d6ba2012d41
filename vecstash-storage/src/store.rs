//! # Store
//!
//! The facade over placement, journal and distance engine.
//!
//! ## Write Path
//!
//! ```text
//! insert_batch(items)
//!   │
//!   ├─► validate every item (no locks held)      ── any failure: nothing happens
//!   ├─► encode embeddings to bytes
//!   ├─► lock writer ─► assign ids ─► journal append + fsync
//!   │                                   └─ failure: file rolled back, no ids consumed
//!   └─► write-lock state ─► classify, allocate, insert   (queries wait only here)
//! ```
//!
//! ## Read Path
//!
//! `query` holds the state read guard for the whole scan, so it observes
//! every record of a batch or none of them.
//!
//! ## Recovery
//!
//! `open` loads the snapshot named by `MANIFEST.json`, then replays journal
//! batches committed after the snapshot's journal sequence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use vecstash_core::error::{Error, Result};
use vecstash_core::metrics::Timer;
use vecstash_core::types::embedding_size;
use vecstash_core::{
    DistanceMetric, MetricsSnapshot, Placement, PlacementClass, RecordId, StoreConfig,
    StoreMetrics, FORMAT_VERSION,
};
use vecstash_index::{CandidateSource, FlatIndex, VectorIndex};

use crate::journal::{Journal, JournalOp, JOURNAL_FILE_NAME};
use crate::placement::{PlacementLayer, ReclaimOutcome, SegmentStats};
use crate::record::{
    decode_embedding, decode_embedding_into, encode_embedding, validate_embedding, RecordDraft,
    VectorRecord,
};
use crate::snapshot::{self, load_snapshot, snapshot_dir, write_snapshot, Manifest, MANIFEST_FILE_NAME};

/// One query result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: RecordId,
    pub content: String,
    pub distance: f32,
}

/// Point-in-time shape of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub records: usize,
    pub inline_records: usize,
    pub overflow_records: usize,
    pub next_id: RecordId,
    pub overflow_live_bytes: usize,
    pub segments: Vec<SegmentStats>,
    pub journal_bytes: u64,
}

/// A record as held in memory. `inline` is set iff the placement is inline.
#[derive(Debug, Clone)]
pub(crate) struct StoredRecord {
    pub content: Arc<str>,
    pub placement: Placement,
    pub inline: Option<Bytes>,
}

struct StoreState {
    dimension: usize,
    records: BTreeMap<RecordId, StoredRecord>,
    placement: PlacementLayer,
}

impl StoreState {
    fn embedding_bytes<'a>(&'a self, id: RecordId, record: &'a StoredRecord) -> Result<&'a [u8]> {
        match (record.placement, &record.inline) {
            (Placement::Inline, Some(bytes)) => Ok(&bytes[..]),
            (Placement::Overflow(handle), None) => self.placement.retrieve(handle),
            _ => Err(Error::Internal {
                message: format!("record {} placement does not match its storage", id),
            }),
        }
    }

    fn apply_insert(&mut self, id: RecordId, content: Arc<str>, bytes: Bytes) -> Result<Placement> {
        if self.records.contains_key(&id) {
            return Err(Error::Internal {
                message: format!("record {} inserted twice", id),
            });
        }
        let (placement, inline) = match self.placement.classify_len(bytes.len()) {
            PlacementClass::Inline => (Placement::Inline, Some(bytes)),
            PlacementClass::Overflow => {
                let handle = self.placement.allocate(id, &bytes)?;
                (Placement::Overflow(handle), None)
            }
        };
        self.records.insert(
            id,
            StoredRecord {
                content,
                placement,
                inline,
            },
        );
        Ok(placement)
    }

    fn apply_delete(&mut self, id: RecordId) -> Result<Option<ReclaimOutcome>> {
        let record = self.records.remove(&id).ok_or(Error::NotFound { id })?;
        match record.placement {
            Placement::Inline => Ok(None),
            Placement::Overflow(handle) => self.placement.reclaim(handle).map(Some),
        }
    }
}

impl CandidateSource for StoreState {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn candidate_count(&self) -> usize {
        self.records.len()
    }

    fn for_each_candidate(&self, visit: &mut dyn FnMut(RecordId, &[f32])) -> Result<()> {
        let mut buf = Vec::with_capacity(self.dimension);
        for (&id, record) in &self.records {
            let bytes = self.embedding_bytes(id, record)?;
            decode_embedding_into(bytes, self.dimension, &mut buf)?;
            visit(id, &buf);
        }
        Ok(())
    }
}

struct WriterState {
    next_id: RecordId,
    journal: Option<Journal>,
    generation: u64,
}

/// A vector store with size-aware placement.
pub struct Store {
    config: StoreConfig,
    state: RwLock<StoreState>,
    writer: Mutex<WriterState>,
    closed: AtomicBool,
    metrics: StoreMetrics,
}

impl Store {
    /// Create an empty store.
    ///
    /// With a data directory, the directory must not already hold a store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut journal = None;
        if let Some(dir) = &config.data_dir {
            std::fs::create_dir_all(dir)?;
            if Self::exists(dir) {
                return Err(Error::Configuration {
                    message: format!("{:?} already contains a store", dir),
                });
            }
            let (created, _) = Journal::open(dir, config.dimension, 1, &config.journal)?;
            journal = Some(created);
        }

        info!(
            "Created store: dimension={}, metric={}, threshold={} bytes, persistent={}",
            config.dimension,
            config.metric,
            config.placement.threshold_bytes,
            journal.is_some()
        );

        let state = StoreState {
            dimension: config.dimension,
            records: BTreeMap::new(),
            placement: PlacementLayer::new(&config.placement),
        };
        Ok(Self::assemble(config, state, RecordId::FIRST, journal, 0))
    }

    /// Open the store in `config.data_dir`, creating it if absent.
    ///
    /// Without a data directory this is the same as [`Store::create`].
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let Some(dir) = config.data_dir.clone() else {
            return Self::create(config);
        };
        std::fs::create_dir_all(&dir)?;

        let timer = Timer::new("store.open");
        let manifest = Manifest::load(&dir)?;

        let (mut state, mut next_id, journal_sequence, generation) = match &manifest {
            Some(m) => {
                if m.dimension != config.dimension || m.metric != config.metric {
                    return Err(Error::Configuration {
                        message: format!(
                            "store at {:?} has dimension {} / {}, configured {} / {}",
                            dir, m.dimension, m.metric, config.dimension, config.metric
                        ),
                    });
                }
                let loaded = load_snapshot(&dir, m, &config.placement)?;
                let state = StoreState {
                    dimension: config.dimension,
                    records: loaded.records,
                    placement: loaded.placement,
                };
                (state, RecordId(m.next_id), m.journal_sequence, m.generation)
            }
            None => {
                let state = StoreState {
                    dimension: config.dimension,
                    records: BTreeMap::new(),
                    placement: PlacementLayer::new(&config.placement),
                };
                (state, RecordId::FIRST, 0, 0)
            }
        };
        snapshot::remove_stale(&dir, manifest.as_ref().map(|m| m.generation))?;

        let (journal, recovery) =
            Journal::open(&dir, config.dimension, journal_sequence + 1, &config.journal)?;

        let expected_len = embedding_size(config.dimension);
        let mut replayed = 0usize;
        for batch in recovery.batches {
            for op in batch.ops {
                match op {
                    JournalOp::Insert {
                        id,
                        content,
                        embedding,
                    } => {
                        if embedding.len() != expected_len {
                            return Err(Error::IndexCorruption {
                                details: format!(
                                    "journal insert {} has {} embedding bytes",
                                    id,
                                    embedding.len()
                                ),
                            });
                        }
                        state.apply_insert(id, content, embedding)?;
                        next_id = next_id.max(id.next());
                    }
                    JournalOp::Delete { id } => {
                        state.apply_delete(id).map_err(|_| Error::IndexCorruption {
                            details: format!("journal deletes unknown record {}", id),
                        })?;
                    }
                }
                replayed += 1;
            }
        }

        info!(
            "Opened store at {:?}: {} records, {} journal operations replayed, next id {} ({:?})",
            dir,
            state.records.len(),
            replayed,
            next_id,
            timer.stop()
        );

        Ok(Self::assemble(config, state, next_id, Some(journal), generation))
    }

    /// Whether `dir` holds store files.
    pub fn exists(dir: impl AsRef<Path>) -> bool {
        let dir = dir.as_ref();
        dir.join(MANIFEST_FILE_NAME).exists() || dir.join(JOURNAL_FILE_NAME).exists()
    }

    /// Delete the store files in `dir`. Other files are left alone.
    pub fn destroy(dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        for name in [MANIFEST_FILE_NAME, JOURNAL_FILE_NAME] {
            match std::fs::remove_file(dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if dir.exists() {
            snapshot::remove_stale(dir, None)?;
        }
        info!("Destroyed store at {:?}", dir);
        Ok(())
    }

    fn assemble(
        config: StoreConfig,
        state: StoreState,
        next_id: RecordId,
        journal: Option<Journal>,
        generation: u64,
    ) -> Self {
        Self {
            config,
            state: RwLock::new(state),
            writer: Mutex::new(WriterState {
                next_id,
                journal,
                generation,
            }),
            closed: AtomicBool::new(false),
            metrics: StoreMetrics::new(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::StoreClosed)
        } else {
            Ok(())
        }
    }

    /// Insert one record.
    pub fn insert(&self, content: impl Into<String>, embedding: Vec<f32>) -> Result<RecordId> {
        let ids = self.insert_batch(std::iter::once((content, embedding)))?;
        ids.into_iter().next().ok_or_else(|| Error::Internal {
            message: "single insert produced no id".to_string(),
        })
    }

    /// Insert many records atomically. Ids are consecutive, in input order.
    pub fn insert_batch<I, S>(&self, items: I) -> Result<Vec<RecordId>>
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<String>,
    {
        self.ensure_open()?;
        let timer = Timer::new("store.insert_batch");

        let drafts = items
            .into_iter()
            .map(|(content, embedding)| {
                RecordDraft::new(content, embedding, self.config.dimension, self.config.content_policy)
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|e| {
                self.metrics.record_rejected_write();
                e
            })?;
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let encoded: Vec<(Arc<str>, Bytes)> = drafts
            .into_iter()
            .map(|draft| {
                let (content, embedding) = draft.into_parts();
                (content, encode_embedding(&embedding))
            })
            .collect();

        let mut writer = self.writer.lock();
        self.ensure_open()?;

        let first = writer.next_id;
        let ids: Vec<RecordId> = (0..encoded.len() as u64)
            .map(|i| RecordId(first.value() + i))
            .collect();

        if let Some(journal) = writer.journal.as_mut() {
            let ops: Vec<JournalOp> = ids
                .iter()
                .zip(&encoded)
                .map(|(&id, (content, embedding))| JournalOp::Insert {
                    id,
                    content: Arc::clone(content),
                    embedding: embedding.clone(),
                })
                .collect();
            let receipt = journal.append_batch(&ops).map_err(|e| {
                self.metrics.record_rejected_write();
                e
            })?;
            self.metrics.record_journal_write(receipt.bytes_written);
        }
        // Ids are durable from here on and must never be handed out again.
        writer.next_id = RecordId(first.value() + ids.len() as u64);

        {
            let mut state = self.state.write();
            for (&id, (content, bytes)) in ids.iter().zip(encoded) {
                let len = bytes.len() as u64;
                match state.apply_insert(id, content, bytes) {
                    Ok(placement) => {
                        if !placement.is_inline() {
                            self.metrics.record_overflow_write(len);
                        }
                    }
                    Err(e) => {
                        // The batch is already committed to the journal, so memory
                        // can no longer be brought back in line with it.
                        self.closed.store(true, Ordering::Release);
                        error!("Applying committed batch at record {} failed, closing store: {}", id, e);
                        return Err(Error::Internal {
                            message: format!("committed batch could not be applied at record {}: {}", id, e),
                        });
                    }
                }
            }
        }

        self.metrics.record_batch(ids.len() as u64);
        debug!("Committed batch of {} records starting at {}", ids.len(), first);
        timer.stop();
        Ok(ids)
    }

    /// The `k` records closest to `query`, closest first.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        self.ensure_open()?;
        validate_embedding(query, self.config.dimension)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read();
        let index = FlatIndex::new(&*state, self.config.metric);
        let results = index.search(query, k)?;
        self.metrics.record_query(index.len() as u64);

        results
            .into_iter()
            .map(|result| {
                let record = state.records.get(&result.id).ok_or_else(|| Error::Internal {
                    message: format!("ranked record {} has no entry", result.id),
                })?;
                Ok(QueryHit {
                    id: result.id,
                    content: record.content.to_string(),
                    distance: result.distance,
                })
            })
            .collect()
    }

    /// Remove a record and free its overflow slot, if any.
    pub fn delete(&self, id: RecordId) -> Result<()> {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        self.ensure_open()?;

        if !self.state.read().records.contains_key(&id) {
            return Err(Error::NotFound { id });
        }

        if let Some(journal) = writer.journal.as_mut() {
            let receipt = journal.append_batch(&[JournalOp::Delete { id }])?;
            self.metrics.record_journal_write(receipt.bytes_written);
        }

        let outcome = self.state.write().apply_delete(id)?;
        match outcome {
            Some(ReclaimOutcome::Compacted { .. }) => self.metrics.record_compaction(),
            Some(ReclaimOutcome::SegmentReleased) => self.metrics.record_segment_release(),
            _ => {}
        }
        self.metrics.record_delete();
        debug!("Deleted record {} ({:?})", id, outcome);
        Ok(())
    }

    /// Owned copy of one record.
    pub fn get(&self, id: RecordId) -> Result<VectorRecord> {
        self.ensure_open()?;
        let state = self.state.read();
        let record = state.records.get(&id).ok_or(Error::NotFound { id })?;
        let bytes = state.embedding_bytes(id, record)?;
        let embedding = decode_embedding(bytes, self.config.dimension)?;
        Ok(VectorRecord::new(
            id,
            Arc::clone(&record.content),
            embedding,
            record.placement,
        ))
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.state.read().records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.config.metric
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.config.data_dir.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StoreStats {
        let writer = self.writer.lock();
        let state = self.state.read();
        let inline_records = state
            .records
            .values()
            .filter(|r| r.placement.is_inline())
            .count();
        StoreStats {
            records: state.records.len(),
            inline_records,
            overflow_records: state.records.len() - inline_records,
            next_id: writer.next_id,
            overflow_live_bytes: state.placement.live_bytes(),
            segments: state.placement.segment_stats(),
            journal_bytes: writer.journal.as_ref().map_or(0, |j| j.size()),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Write a snapshot and reset the journal. Returns the new generation.
    pub fn checkpoint(&self) -> Result<u64> {
        self.ensure_open()?;
        let dir: PathBuf = self.config.data_dir.clone().ok_or_else(|| Error::Configuration {
            message: "checkpoint requires a data directory".to_string(),
        })?;

        let timer = Timer::new("store.checkpoint");
        let mut writer = self.writer.lock();
        self.ensure_open()?;

        let generation = writer.generation + 1;
        let journal_sequence = writer.journal.as_ref().map_or(0, |j| j.last_sequence());

        let manifest = {
            let state = self.state.read();
            let segments = write_snapshot(
                &snapshot_dir(&dir, generation),
                self.config.dimension,
                self.config.metric,
                writer.next_id,
                &state.records,
                &state.placement,
            )?;
            Manifest {
                format_version: FORMAT_VERSION,
                generation,
                dimension: self.config.dimension,
                metric: self.config.metric,
                next_id: writer.next_id.value(),
                journal_sequence,
                record_count: state.records.len() as u64,
                segments,
            }
        };
        manifest.store(&dir)?;
        writer.generation = generation;

        if let Some(journal) = writer.journal.as_mut() {
            journal.reset()?;
        }
        snapshot::remove_stale(&dir, Some(generation))?;

        self.metrics.record_checkpoint();
        info!(
            "Checkpoint {} written: {} records, journal sequence {} ({:?})",
            generation,
            manifest.record_count,
            journal_sequence,
            timer.stop()
        );
        Ok(generation)
    }

    /// Force journal contents to disk.
    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        if let Some(journal) = self.writer.lock().journal.as_mut() {
            journal.sync()?;
        }
        Ok(())
    }

    /// Close the store. Later operations fail with `StoreClosed`.
    pub fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(mut journal) = writer.journal.take() {
            journal.sync()?;
        }
        info!("Closed store ({} records)", self.state.read().records.len());
        Ok(())
    }
}
