//! # Error Handling
//!
//! Error types for vecstash operations.
//!
//! ## Categories
//!
//! 1. **Caller input**: `DimensionMismatch`, `InvalidEmbedding`, `InvalidRecord`,
//!    `NotFound`, `StoreClosed`. Always surfaced, never partially applied.
//! 2. **Placement internals**: `SegmentFull` is retried inside the placement
//!    layer; `CorruptHandle` is a logic defect and is fatal.
//! 3. **System**: journal, snapshot and I/O failures.

use thiserror::Error;

use crate::types::{RecordId, SegmentHandle, SegmentId};

/// Result type alias for vecstash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for vecstash
#[derive(Error, Debug)]
pub enum Error {
    // Caller Errors
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding: element {index} is not finite")]
    InvalidEmbedding { index: usize },

    #[error("Invalid record: {message}")]
    InvalidRecord { message: String },

    #[error("Record not found: {id}")]
    NotFound { id: RecordId },

    #[error("Store is closed")]
    StoreClosed,

    // Placement Errors
    #[error("Segment {segment_id} full: {requested} bytes requested, {available} available")]
    SegmentFull { segment_id: SegmentId, requested: usize, available: usize },

    #[error("Corrupt overflow handle {handle}: {details}")]
    CorruptHandle { handle: SegmentHandle, details: String },

    // Persistence Errors
    #[error("Journal error: {message}")]
    Journal { message: String, source: Option<Box<dyn std::error::Error + Send + Sync>> },

    #[error("Index corruption detected: {details}")]
    IndexCorruption { details: String },

    // Ingestion Errors
    #[error("Embedding failed: {message}")]
    Embedding { message: String },

    // System Errors
    #[error("IO error: {message}")]
    Io { message: String, source: std::io::Error },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Errors caused by caller-supplied input, as opposed to internal faults.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::DimensionMismatch { .. }
                | Error::InvalidEmbedding { .. }
                | Error::InvalidRecord { .. }
                | Error::NotFound { .. }
                | Error::StoreClosed
        )
    }

    /// Logic defects that must never be retried or masked.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::CorruptHandle { .. } | Error::IndexCorruption { .. } | Error::Internal { .. }
        )
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::SegmentFull { .. } => true,
            Error::CorruptHandle { .. } => false,
            Error::IndexCorruption { .. } => false,
            Error::StoreClosed => false,
            Error::Io { .. } => false,
            _ => true,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Error::InvalidEmbedding { .. } => "INVALID_EMBEDDING",
            Error::InvalidRecord { .. } => "INVALID_RECORD",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::StoreClosed => "STORE_CLOSED",
            Error::SegmentFull { .. } => "SEGMENT_FULL",
            Error::CorruptHandle { .. } => "CORRUPT_HANDLE",
            Error::Journal { .. } => "JOURNAL_ERROR",
            Error::IndexCorruption { .. } => "INDEX_CORRUPTION",
            Error::Embedding { .. } => "EMBEDDING_ERROR",
            Error::Io { .. } => "IO_ERROR",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Extension trait for adding context to results
pub trait ResultExt<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| match e {
            Error::Io { message, source } => Error::Io {
                message: format!("{}: {}", f(), message),
                source,
            },
            Error::IndexCorruption { details } => Error::IndexCorruption {
                details: format!("{}: {}", f(), details),
            },
            other => Error::Internal {
                message: format!("{}: {}", f(), other),
            },
        })
    }
}
