//! # vecstash Ingestion API
//!
//! Embedding model seam and the text ingestion pipeline.
//!
//! ```ignore
//! let store = Arc::new(Store::open(config.store)?);
//! let embedder = Arc::new(HashingEmbedder::new(store.dimension()));
//! let pipeline = IngestionPipeline::new(embedder, store)?;
//!
//! pipeline.ingest("The cat sits on the mat").await?;
//! for hit in pipeline.search("kitten", 5).await? {
//!     println!("{:.4} - {}", hit.similarity, hit.content);
//! }
//! ```

pub mod embedder;
pub mod pipeline;

pub use embedder::{builtin_embedder, Embedder, HashingEmbedder, NoOpEmbedder};
pub use pipeline::{similarity, Comparison, IngestionPipeline, SearchMatch, DEFAULT_BATCH_SIZE};
