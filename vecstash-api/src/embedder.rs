//! # Embedding Trait
//!
//! Trait for plugging embedding models into vecstash.
//!
//! The store never runs a model itself. Anything that turns text into a
//! fixed-length `f32` vector can sit behind [`Embedder`]:
//!
//! 1. **Local models** (candle, ort, tract): all-MiniLM-L6-v2 (384 dims),
//!    BGE-large (1024 dims)
//! 2. **Remote APIs** and self-hosted inference servers
//!
//! [`HashingEmbedder`] is a deterministic, model-free stand-in used by the
//! CLI and tests. It only captures lexical overlap.

use std::sync::Arc;

use async_trait::async_trait;
use vecstash_core::checksum::{crc32_checksum, crc32_checksum_parts};
use vecstash_core::error::{Error, Result};
use vecstash_index::normalize;

/// Trait for embedding text into vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text string
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts, one vector per text in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Vector dimension
    fn dimension(&self) -> usize;

    /// Model identifier, for logs and stats.
    fn model_name(&self) -> &str;
}

/// Feature-hashing embedder.
///
/// Each lowercase word and each of its character trigrams is hashed to a
/// bucket with a pseudo-random sign. The sum is L2-normalised, so texts
/// sharing words score a high cosine similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self::with_model_name(dimension, format!("hashing-{}", dimension))
    }

    pub fn with_model_name(dimension: usize, model_name: impl Into<String>) -> Self {
        Self {
            dimension,
            model_name: model_name.into(),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let bucket = crc32_checksum(feature) as usize % self.dimension;
        let sign = if crc32_checksum_parts(&[b"sign", feature]) & 1 == 0 {
            1.0
        } else {
            -1.0
        };
        vector[bucket] += sign * weight;
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in tokenize(text) {
            self.add_feature(&mut vector, word.as_bytes(), WORD_WEIGHT);

            let padded: Vec<char> = format!("#{}#", word).chars().collect();
            for trigram in padded.windows(3) {
                let trigram: String = trigram.iter().collect();
                self.add_feature(&mut vector, trigram.as_bytes(), TRIGRAM_WEIGHT);
            }
        }
        normalize(&mut vector);
        vector
    }
}

/// Lowercase alphanumeric words.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimension == 0 {
            return Err(Error::Embedding {
                message: "embedder dimension must be positive".into(),
            });
        }
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// No-op embedder for tests or when embeddings are pre-computed
pub struct NoOpEmbedder {
    pub dimension: usize,
}

impl NoOpEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for NoOpEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.0; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "noop"
    }
}

/// Build a built-in embedder by name.
pub fn builtin_embedder(name: &str, dimension: usize) -> Result<Arc<dyn Embedder>> {
    match name {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(dimension))),
        "noop" => Ok(Arc::new(NoOpEmbedder::new(dimension))),
        other => Err(Error::Configuration {
            message: format!("unknown embedder {:?}, expected \"hashing\" or \"noop\"", other),
        }),
    }
}
