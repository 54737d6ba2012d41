//! # Vector Records
//!
//! A [`RecordDraft`] is caller input that has passed validation but has no id
//! or placement yet. A [`VectorRecord`] is what the store hands back: fully
//! assigned and immutable.
//!
//! Embeddings are serialized as little-endian `f32`, four bytes per element,
//! with no header. The same bytes are stored inline, in overflow segments, in
//! the journal and in snapshot files.

use std::io::Cursor;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use vecstash_core::error::{Error, Result};
use vecstash_core::types::embedding_size;
use vecstash_core::{ContentPolicy, Placement, RecordId};

/// Largest content plus embedding size of one record. Keeps every journal
/// entry, with its id and length fields, inside the journal's entry limit.
pub const MAX_RECORD_BYTES: usize = 255 * 1024 * 1024;

/// Validated insert input.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    content: Arc<str>,
    embedding: Vec<f32>,
}

impl RecordDraft {
    /// Validate `content` and `embedding` against a store's shape.
    ///
    /// Dimension is checked first, then every element for finiteness, then
    /// the content policy, then the record size.
    pub fn new(
        content: impl Into<String>,
        embedding: Vec<f32>,
        dimension: usize,
        policy: ContentPolicy,
    ) -> Result<Self> {
        let content = content.into();
        validate_embedding(&embedding, dimension)?;
        if policy == ContentPolicy::Required && content.is_empty() {
            return Err(Error::InvalidRecord {
                message: "content must not be empty".to_string(),
            });
        }
        check_record_size(content.len(), dimension)?;
        Ok(Self {
            content: Arc::from(content),
            embedding,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub(crate) fn into_parts(self) -> (Arc<str>, Vec<f32>) {
        (self.content, self.embedding)
    }
}

fn check_record_size(content_len: usize, dimension: usize) -> Result<()> {
    let size = content_len.saturating_add(embedding_size(dimension));
    if size > MAX_RECORD_BYTES {
        return Err(Error::InvalidRecord {
            message: format!("record of {} bytes exceeds the {} byte limit", size, MAX_RECORD_BYTES),
        });
    }
    Ok(())
}

/// Check length and finiteness of a vector headed for the store.
pub fn validate_embedding(embedding: &[f32], dimension: usize) -> Result<()> {
    if embedding.len() != dimension {
        return Err(Error::DimensionMismatch {
            expected: dimension,
            actual: embedding.len(),
        });
    }
    if let Some(index) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(Error::InvalidEmbedding { index });
    }
    Ok(())
}

/// A stored record. Owned copy; mutating it does not affect the store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    id: RecordId,
    content: Arc<str>,
    embedding: Vec<f32>,
    placement: Placement,
}

impl VectorRecord {
    pub(crate) fn new(
        id: RecordId,
        content: Arc<str>,
        embedding: Vec<f32>,
        placement: Placement,
    ) -> Self {
        Self {
            id,
            content,
            embedding,
            placement,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }
}

/// Serialize an embedding to its on-disk byte form.
pub fn encode_embedding(embedding: &[f32]) -> Bytes {
    let mut buf = Vec::with_capacity(embedding_size(embedding.len()));
    for &value in embedding {
        // Writing into a Vec cannot fail.
        let _ = buf.write_f32::<LittleEndian>(value);
    }
    Bytes::from(buf)
}

/// Decode `bytes` into a fresh vector of `dimension` elements.
pub fn decode_embedding(bytes: &[u8], dimension: usize) -> Result<Vec<f32>> {
    let mut out = Vec::with_capacity(dimension);
    decode_embedding_into(bytes, dimension, &mut out)?;
    Ok(out)
}

/// Decode into a caller-owned buffer, reusing its allocation.
pub fn decode_embedding_into(bytes: &[u8], dimension: usize, out: &mut Vec<f32>) -> Result<()> {
    if bytes.len() != embedding_size(dimension) {
        return Err(Error::IndexCorruption {
            details: format!(
                "embedding has {} bytes, expected {} for dimension {}",
                bytes.len(),
                embedding_size(dimension),
                dimension
            ),
        });
    }
    out.clear();
    out.resize(dimension, 0.0);
    Cursor::new(bytes).read_f32_into::<LittleEndian>(out)?;
    Ok(())
}
