//! # vecstash Distance Engine
//!
//! Pure numeric scoring and exact nearest-neighbour ranking.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Distance Engine                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │    SIMD     │───>│  score /    │───>│    Flat     │     │
//! │  │   Kernels   │    │  rank/TopK  │    │   Index     │     │
//! │  │ (AVX2/NEON) │    │             │    │  (Exact)    │     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │                                               │             │
//! │                                   VectorIndex / CandidateSource
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `simd`: SIMD-accelerated kernels (AVX2/FMA, NEON)
//! - `distance`: metric scoring, bounded top-k, `rank`
//! - `traits`: `VectorIndex` and `CandidateSource`
//! - `flat`: brute-force exact search

pub mod distance;
pub mod flat;
pub mod simd;
pub mod traits;

pub use distance::{cosine_similarity, rank, score, PreparedQuery, TopK, MAX_DISTANCE};
pub use flat::FlatIndex;
pub use simd::{dot_product, l2_distance, l2_distance_squared, norm, normalize};
pub use traits::{CandidateSource, SearchResult, VectorIndex};

pub use vecstash_core::DistanceMetric;
