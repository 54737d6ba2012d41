//! # vecstash Storage Engine
//!
//! Vector records with size-aware placement, a write-ahead journal and
//! checkpoint snapshots.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Write Path                              │
//! │                                                              │
//! │  insert_batch ──> Journal (commit marker) ──> Placement      │
//! │                      │                        │    │         │
//! │                      ▼                        ▼    ▼         │
//! │                   fsync                    Inline  Overflow  │
//! │                                            bytes   segment   │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Read Path                               │
//! │                                                              │
//! │  query ──> FlatIndex over every record ──> top-k hits        │
//! │                │                                             │
//! │                ▼                                             │
//! │   inline bytes or segment slot, decoded per candidate        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod journal;
pub mod placement;
pub mod record;
pub mod snapshot;
pub mod store;

pub use journal::{Journal, JournalOp};
pub use placement::{PlacementLayer, ReclaimOutcome, SegmentStats};
pub use record::{decode_embedding, encode_embedding, RecordDraft, VectorRecord};
pub use snapshot::Manifest;
pub use store::{QueryHit, Store, StoreStats};
