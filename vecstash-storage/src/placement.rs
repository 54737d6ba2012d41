//! # Placement Layer
//!
//! Decides where a vector's bytes live and owns the overflow segments.
//!
//! ```text
//!   embedding bytes ──► classify ──┬── len ≤ threshold ──► Inline (kept in the record entry)
//!                                  │
//!                                  └── len > threshold ──► allocate ──► open segment
//!                                                               │
//!                                               full? roll over ┘
//!
//!   Segment
//!   ┌────────────────────────────────────────────────────────────┐
//!   │ data: [ slot A bytes | slot B bytes | ... ]                 │
//!   │ slots: logical offset ─► (record id, physical pos, length)  │
//!   │ live_bytes / data.len() < ratio  ─►  compact in place       │
//!   │ no live slots                    ─►  release segment        │
//!   └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handles carry the *logical* offset, which never changes after allocation,
//! so compaction only rewrites the slot table and never touches records.

use std::collections::BTreeMap;

use tracing::debug;

use vecstash_core::error::{Error, Result};
use vecstash_core::types::embedding_size;
use vecstash_core::{PlacementClass, PlacementConfig, RecordId, SegmentHandle, SegmentId};

/// What `reclaim` did to the segment that held the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// Slot freed, segment kept as-is.
    Marked,
    /// Slot freed and the segment rewritten without dead bytes.
    Compacted { reclaimed_bytes: usize },
    /// Segment had no live slots left and was dropped.
    SegmentReleased,
}

/// Occupancy of one overflow segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentStats {
    pub segment_id: SegmentId,
    pub slot_count: usize,
    pub live_bytes: usize,
    pub physical_bytes: usize,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    record_id: RecordId,
    physical: usize,
    len: usize,
}

/// An append-only byte region holding overflow vectors.
#[derive(Debug)]
pub struct Segment {
    id: SegmentId,
    data: Vec<u8>,
    slots: BTreeMap<u64, Slot>,
    live_bytes: usize,
    next_logical: u64,
}

impl Segment {
    fn new(id: SegmentId) -> Self {
        Self {
            id,
            data: Vec::new(),
            slots: BTreeMap::new(),
            live_bytes: 0,
            next_logical: 0,
        }
    }

    /// Rebuild a segment from persisted slots, packed in logical order.
    pub(crate) fn from_slots(
        id: SegmentId,
        next_logical: u64,
        slots: impl IntoIterator<Item = (u64, RecordId, Vec<u8>)>,
    ) -> Result<Self> {
        let mut segment = Self::new(id);
        segment.next_logical = next_logical;
        for (logical, record_id, bytes) in slots {
            if logical >= next_logical || segment.slots.contains_key(&logical) {
                return Err(Error::IndexCorruption {
                    details: format!("segment {} has invalid slot offset {}", id, logical),
                });
            }
            let slot = Slot {
                record_id,
                physical: segment.data.len(),
                len: bytes.len(),
            };
            segment.data.extend_from_slice(&bytes);
            segment.live_bytes += bytes.len();
            segment.slots.insert(logical, slot);
        }
        Ok(segment)
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn next_logical(&self) -> u64 {
        self.next_logical
    }

    pub fn stats(&self) -> SegmentStats {
        SegmentStats {
            segment_id: self.id,
            slot_count: self.slots.len(),
            live_bytes: self.live_bytes,
            physical_bytes: self.data.len(),
        }
    }

    /// Live slots in logical order: `(logical offset, record id, bytes)`.
    pub fn live_slots(&self) -> impl Iterator<Item = (u64, RecordId, &[u8])> + '_ {
        self.slots.iter().map(move |(&logical, slot)| {
            (logical, slot.record_id, &self.data[slot.physical..slot.physical + slot.len])
        })
    }

    fn try_append(&mut self, record_id: RecordId, bytes: &[u8], capacity: usize) -> Result<u64> {
        // An empty segment takes anything, so oversized vectors get a segment of their own.
        if !self.data.is_empty() && self.data.len() + bytes.len() > capacity {
            return Err(Error::SegmentFull {
                segment_id: self.id,
                requested: bytes.len(),
                available: capacity.saturating_sub(self.data.len()),
            });
        }
        let logical = self.next_logical;
        self.slots.insert(
            logical,
            Slot {
                record_id,
                physical: self.data.len(),
                len: bytes.len(),
            },
        );
        self.data.extend_from_slice(bytes);
        self.live_bytes += bytes.len();
        self.next_logical += bytes.len() as u64;
        Ok(logical)
    }

    fn get(&self, logical: u64) -> Option<&[u8]> {
        self.slots
            .get(&logical)
            .map(|slot| &self.data[slot.physical..slot.physical + slot.len])
    }

    fn compact(&mut self) -> usize {
        let before = self.data.len();
        let mut data = Vec::with_capacity(self.live_bytes);
        for slot in self.slots.values_mut() {
            let start = data.len();
            data.extend_from_slice(&self.data[slot.physical..slot.physical + slot.len]);
            slot.physical = start;
        }
        self.data = data;
        before - self.data.len()
    }
}

/// Classifies vectors and manages overflow segments.
#[derive(Debug)]
pub struct PlacementLayer {
    threshold_bytes: usize,
    segment_capacity: usize,
    compaction_ratio: f64,
    segments: BTreeMap<SegmentId, Segment>,
    open: Option<SegmentId>,
    next_segment_id: SegmentId,
}

impl PlacementLayer {
    pub fn new(config: &PlacementConfig) -> Self {
        Self {
            threshold_bytes: config.threshold_bytes,
            segment_capacity: config.segment_capacity,
            compaction_ratio: config.compaction_ratio,
            segments: BTreeMap::new(),
            open: None,
            next_segment_id: 1,
        }
    }

    pub fn threshold_bytes(&self) -> usize {
        self.threshold_bytes
    }

    /// Inline iff the serialized size is at most the threshold.
    pub fn classify(&self, embedding: &[f32]) -> PlacementClass {
        self.classify_len(embedding_size(embedding.len()))
    }

    pub fn classify_len(&self, byte_len: usize) -> PlacementClass {
        if byte_len > self.threshold_bytes {
            PlacementClass::Overflow
        } else {
            PlacementClass::Inline
        }
    }

    /// Append `bytes` to the open segment, rolling to a new one when full.
    pub fn allocate(&mut self, record_id: RecordId, bytes: &[u8]) -> Result<SegmentHandle> {
        let capacity = self.segment_capacity;
        let segment_id = match self.open {
            Some(id) => id,
            None => self.start_segment(),
        };

        let segment = self.segment_mut(segment_id)?;
        let offset = match segment.try_append(record_id, bytes, capacity) {
            Ok(offset) => offset,
            Err(Error::SegmentFull {
                segment_id,
                requested,
                available,
            }) => {
                debug!(
                    "Segment {} full ({} requested, {} available), rolling over",
                    segment_id, requested, available
                );
                let fresh = self.start_segment();
                return self
                    .segment_mut(fresh)?
                    .try_append(record_id, bytes, capacity)
                    .map(|offset| SegmentHandle {
                        segment_id: fresh,
                        offset,
                    });
            }
            Err(e) => return Err(e),
        };

        Ok(SegmentHandle { segment_id, offset })
    }

    /// Exact bytes stored under `handle`.
    pub fn retrieve(&self, handle: SegmentHandle) -> Result<&[u8]> {
        let segment = self.segments.get(&handle.segment_id).ok_or_else(|| Error::CorruptHandle {
            handle,
            details: "segment does not exist".to_string(),
        })?;
        segment.get(handle.offset).ok_or_else(|| Error::CorruptHandle {
            handle,
            details: "no slot at offset".to_string(),
        })
    }

    /// Free the slot behind `handle`.
    pub fn reclaim(&mut self, handle: SegmentHandle) -> Result<ReclaimOutcome> {
        let ratio = self.compaction_ratio;
        let segment = self
            .segments
            .get_mut(&handle.segment_id)
            .ok_or_else(|| Error::CorruptHandle {
                handle,
                details: "segment does not exist".to_string(),
            })?;
        let slot = segment.slots.remove(&handle.offset).ok_or_else(|| Error::CorruptHandle {
            handle,
            details: "no slot at offset".to_string(),
        })?;
        segment.live_bytes -= slot.len;

        if segment.slots.is_empty() {
            self.segments.remove(&handle.segment_id);
            if self.open == Some(handle.segment_id) {
                self.open = None;
            }
            debug!("Released empty segment {}", handle.segment_id);
            return Ok(ReclaimOutcome::SegmentReleased);
        }

        let occupancy = segment.live_bytes as f64 / segment.data.len() as f64;
        if occupancy < ratio {
            let reclaimed_bytes = segment.compact();
            debug!(
                "Compacted segment {}: reclaimed {} bytes, {} slots live",
                handle.segment_id,
                reclaimed_bytes,
                segment.slots.len()
            );
            return Ok(ReclaimOutcome::Compacted { reclaimed_bytes });
        }

        Ok(ReclaimOutcome::Marked)
    }

    pub fn segment_stats(&self) -> Vec<SegmentStats> {
        self.segments.values().map(Segment::stats).collect()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Live overflow bytes across all segments.
    pub fn live_bytes(&self) -> usize {
        self.segments.values().map(|s| s.live_bytes).sum()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    /// Install a segment read from a snapshot. The newest one becomes the open segment.
    pub(crate) fn restore_segment(&mut self, segment: Segment) -> Result<()> {
        let id = segment.id;
        if self.segments.contains_key(&id) {
            return Err(Error::IndexCorruption {
                details: format!("segment {} restored twice", id),
            });
        }
        self.segments.insert(id, segment);
        self.next_segment_id = self.next_segment_id.max(id + 1);
        if self.open.map_or(true, |open| id > open) {
            self.open = Some(id);
        }
        Ok(())
    }

    fn start_segment(&mut self) -> SegmentId {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        self.segments.insert(id, Segment::new(id));
        self.open = Some(id);
        debug!("Opened overflow segment {}", id);
        id
    }

    fn segment_mut(&mut self, id: SegmentId) -> Result<&mut Segment> {
        self.segments.get_mut(&id).ok_or_else(|| Error::Internal {
            message: format!("open segment {} missing", id),
        })
    }
}
