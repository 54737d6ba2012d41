//! # Ingestion Pipeline
//!
//! Text in, records out. The pipeline owns an [`Embedder`] and a shared
//! [`Store`] and bridges the async model call with the synchronous store.
//!
//! ```text
//! texts ──chunk(batch_size)──> embed_batch ──> spawn_blocking(insert_batch)
//!                                                   │
//!                                    one atomic commit per chunk
//! ```
//!
//! Store calls run on the blocking pool because a commit may fsync.

use std::sync::Arc;

use tracing::{debug, info};

use vecstash_core::error::{Error, Result};
use vecstash_core::{DistanceMetric, RecordId};
use vecstash_index::{cosine_similarity, MAX_DISTANCE};
use vecstash_storage::{QueryHit, Store};

use crate::embedder::Embedder;

/// Default records per commit.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// One search result with a similarity score (higher is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub id: RecordId,
    pub content: String,
    pub distance: f32,
    pub similarity: f32,
}

/// Result of comparing two texts.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub first: Vec<f32>,
    pub second: Vec<f32>,
    pub similarity: f32,
}

/// Convert a distance into a similarity for display.
///
/// Cosine reports `1 - distance`, negative inner product reports the inner
/// product, Euclidean reports `1 / (1 + distance)`. An undefined distance
/// reports 0.
pub fn similarity(metric: DistanceMetric, distance: f32) -> f32 {
    if distance == MAX_DISTANCE {
        return 0.0;
    }
    match metric {
        DistanceMetric::Cosine => 1.0 - distance,
        DistanceMetric::NegativeInnerProduct => -distance,
        DistanceMetric::Euclidean => 1.0 / (1.0 + distance),
    }
}

pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<Store>,
    batch_size: usize,
}

impl IngestionPipeline {
    /// Fails with `Configuration` if the embedder and store disagree on
    /// dimension.
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<Store>) -> Result<Self> {
        if embedder.dimension() != store.dimension() {
            return Err(Error::Configuration {
                message: format!(
                    "embedder {} produces {} dims, store expects {}",
                    embedder.model_name(),
                    embedder.dimension(),
                    store.dimension()
                ),
            });
        }
        Ok(Self {
            embedder,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Configuration {
                message: "batch_size must be positive".into(),
            });
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed and insert one text.
    pub async fn ingest(&self, text: &str) -> Result<RecordId> {
        let embedding = self.embedder.embed(text).await?;
        let content = text.to_string();
        self.blocking(move |store| store.insert(content, embedding))
            .await
    }

    /// Embed and insert many texts.
    ///
    /// Each chunk of `batch_size` texts commits atomically. On error, earlier
    /// chunks stay committed and their ids are lost to the caller.
    pub async fn ingest_batch<T: AsRef<str>>(&self, texts: &[T]) -> Result<Vec<RecordId>> {
        let mut ids = Vec::with_capacity(texts.len());
        for (n, chunk) in texts.chunks(self.batch_size).enumerate() {
            let refs: Vec<&str> = chunk.iter().map(|t| t.as_ref()).collect();
            let embeddings = self.embedder.embed_batch(&refs).await?;
            if embeddings.len() != refs.len() {
                return Err(Error::Embedding {
                    message: format!(
                        "{} returned {} vectors for {} texts",
                        self.embedder.model_name(),
                        embeddings.len(),
                        refs.len()
                    ),
                });
            }

            let items: Vec<(String, Vec<f32>)> = refs
                .iter()
                .map(|t| t.to_string())
                .zip(embeddings)
                .collect();
            let chunk_ids = self
                .blocking(move |store| store.insert_batch(items))
                .await?;
            debug!("Committed chunk {} ({} records)", n, chunk_ids.len());
            ids.extend(chunk_ids);
        }
        info!("Ingested {} texts with {}", ids.len(), self.embedder.model_name());
        Ok(ids)
    }

    /// The `k` stored texts closest to `text`.
    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<SearchMatch>> {
        let query = self.embedder.embed(text).await?;
        let metric = self.store.metric();
        let hits = self.blocking(move |store| store.query(&query, k)).await?;
        Ok(hits
            .into_iter()
            .map(|QueryHit { id, content, distance }| SearchMatch {
                id,
                content,
                distance,
                similarity: similarity(metric, distance),
            })
            .collect())
    }

    /// Cosine similarity of two texts. Nothing is stored.
    pub async fn compare(&self, first: &str, second: &str) -> Result<Comparison> {
        let mut embeddings = self.embedder.embed_batch(&[first, second]).await?;
        let (Some(second), Some(first)) = (embeddings.pop(), embeddings.pop()) else {
            return Err(Error::Embedding {
                message: format!("{} returned too few vectors", self.embedder.model_name()),
            });
        };
        let similarity = cosine_similarity(&first, &second);
        Ok(Comparison {
            first,
            second,
            similarity,
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| Error::Internal {
                message: format!("store task failed: {}", e),
            })?
    }
}
