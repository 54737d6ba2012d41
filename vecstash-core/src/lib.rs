//! # vecstash Core
//!
//! This crate provides the fundamental building blocks for vecstash:
//! - Shared record, placement and metric types
//! - Error types
//! - Configuration
//! - Metrics and checksums
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  vecstash-core                  │
//! ├─────────────────────────────────────────────────┤
//! │  • types    - Record ids, placement, metrics    │
//! │  • error    - Error handling                    │
//! │  • config   - Store / ingestion / logging       │
//! │  • metrics  - Lock-free counters                │
//! │  • checksum - CRC32 framing helpers             │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod checksum;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// Re-export commonly used types
pub use config::{Config, PlacementConfig, StoreConfig};
pub use error::{Error, Result};
pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use types::{
    ContentPolicy, DistanceMetric, Placement, PlacementClass, RecordId, SegmentHandle, SegmentId,
    ELEMENT_WIDTH,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const FORMAT_VERSION: u32 = 1;
