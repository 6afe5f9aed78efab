//! Indexer
//!
//! Orchestration on top of the chain, fetcher, classifier and store:
//!
//! - **controller**: backfill, periodic polling, reindex and deferred
//!   enrichment with a start/stop lifecycle
//! - **search**: ad-hoc time-range queries folded into an ephemeral store
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Idle -> Backfilling -> Polling <-> Reindexing
//!                           |
//!                        Stopped
//!
//! Cycle:
//!   head -> PaginatedLogFetcher -> classify_all -> EntityStore.apply_batch -> cursor
//! ```

pub mod controller;
pub mod error;
pub mod search;

pub use controller::{CycleReport, IndexController, IndexPhase, IndexerConfig};
pub use error::{IndexError, IndexResult};
pub use search::{EventCounts, FetchStats, SearchResult, TimeRangeSearch};
