//! # Core Types
//!
//! Fundamental data structures shared by the index, storage and ingestion
//! crates.
//!
//! ```text
//! VectorRecord
//! ├── id         RecordId          assigned at insert, never reused
//! ├── content    UTF-8 text        write-once payload
//! ├── embedding  [f32; D]          write-once, D fixed per store
//! └── placement  Placement         derived from the serialized size
//!                ├── Inline                    bytes live in the index entry
//!                └── Overflow(SegmentHandle)   bytes live in a segment
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width in bytes of one serialized embedding element (little-endian f32).
pub const ELEMENT_WIDTH: usize = std::mem::size_of::<f32>();

/// Process-unique record identifier.
///
/// Ids start at 1 and grow strictly in insertion order. A failed insert
/// never consumes an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    /// First id handed out by an empty store.
    pub const FIRST: RecordId = RecordId(1);

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> RecordId {
        RecordId(self.0 + 1)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identifier of an overflow segment.
pub type SegmentId = u32;

/// Location of an overflow vector.
///
/// `offset` is the logical append offset inside the segment. It stays valid
/// when the segment is compacted; the segment maps it to a physical position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentHandle {
    pub segment_id: SegmentId,
    pub offset: u64,
}

impl fmt::Display for SegmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {}@{}", self.segment_id, self.offset)
    }
}

/// Physical placement of a record's embedding bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    Inline,
    Overflow(SegmentHandle),
}

impl Placement {
    pub fn is_inline(&self) -> bool {
        matches!(self, Placement::Inline)
    }

    pub fn handle(&self) -> Option<SegmentHandle> {
        match self {
            Placement::Inline => None,
            Placement::Overflow(handle) => Some(*handle),
        }
    }
}

/// Outcome of classifying an embedding against the overflow threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementClass {
    Inline,
    Overflow,
}

/// Distance metric. Lower distance always means more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`
    Cosine,
    /// `-dot(a, b)`
    NegativeInnerProduct,
    /// `sqrt(sum((a_i - b_i)^2))`
    Euclidean,
}

impl DistanceMetric {
    /// Stable tag used by the on-disk formats.
    pub fn as_byte(&self) -> u8 {
        match self {
            DistanceMetric::Cosine => 0,
            DistanceMetric::NegativeInnerProduct => 1,
            DistanceMetric::Euclidean => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(DistanceMetric::Cosine),
            1 => Some(DistanceMetric::NegativeInnerProduct),
            2 => Some(DistanceMetric::Euclidean),
            _ => None,
        }
    }

    /// pgvector-style operator name, handy for log lines.
    pub fn operator(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "<=>",
            DistanceMetric::NegativeInnerProduct => "<#>",
            DistanceMetric::Euclidean => "<->",
        }
    }
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::Cosine
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::NegativeInnerProduct => "negative_inner_product",
            DistanceMetric::Euclidean => "euclidean",
        };
        f.write_str(name)
    }
}

/// Whether empty content is accepted on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentPolicy {
    /// Content must be non-empty.
    Required,
    /// Empty content is stored as-is.
    Nullable,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        ContentPolicy::Required
    }
}

/// Serialized size of an embedding with `dimension` elements.
#[inline]
pub fn embedding_size(dimension: usize) -> usize {
    dimension * ELEMENT_WIDTH
}
