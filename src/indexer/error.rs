//! Indexer error types

use thiserror::Error;

use crate::chain::SourceError;

/// Errors fatal to an indexing or search operation
///
/// Per-page, per-log and enrichment failures never surface here; they are
/// logged and reported in cycle summaries instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Invalid time range: from {from_time} is after to {to_time}")]
    InvalidRange { from_time: u64, to_time: u64 },

    #[error("Chain head unavailable: {0}")]
    HeadUnavailable(SourceError),

    #[error("Indexer is already running")]
    AlreadyRunning,
}

/// Result type alias for indexer operations
pub type IndexResult<T> = Result<T, IndexError>;
