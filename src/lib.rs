//! # Fargift Indexer
//!
//! Event-sourced indexer for Fargift presents. Gift state is rebuilt from the
//! present contract's `WrapPresent`, `UnwrapPresent` and `TakeBack` logs,
//! enriched with contract snapshot reads, and served over HTTP.
//!
//! ## Modules
//!
//! - [`chain`]: JSON-RPC provider, ABI decoding and the provider traits
//! - [`events`]: Log classification into typed present events
//! - [`store`]: Entity store with the present status state machine
//! - [`fetcher`]: Paginated, bounded-concurrency log fetching
//! - [`resolver`]: Wall-clock to block-range resolution
//! - [`cache`]: TTL cache for time-range search results
//! - [`indexer`]: Backfill/poll/reindex controller and time-range search
//! - [`api`]: REST API server with Axum
//!
//! ```text
//! ┌────────────┐   logs    ┌──────────────┐  events  ┌─────────────┐
//! │ RpcClient  │ ────────▶ │ LogFetcher   │ ───────▶ │ EntityStore │
//! │ (LogSource)│           │ + classify   │          │             │
//! └────────────┘           └──────────────┘          └──────┬──────┘
//!        ▲ snapshots                                        │
//!        └──────────── IndexController ◀────────────────────┤
//!                                                           ▼
//!                                                     REST API (Axum)
//! ```

pub mod api;
pub mod cache;
pub mod chain;
pub mod config;
pub mod events;
pub mod fetcher;
pub mod indexer;
pub mod resolver;
pub mod store;

#[cfg(test)]
mod testing;

pub use chain::{LogSource, PresentReader, RpcClient, RpcConfig, SourceError};
pub use config::Config;
pub use events::{ChainEvent, EventKind, PresentEvent};
pub use indexer::{IndexController, IndexError, IndexerConfig, TimeRangeSearch};
pub use store::{EntityStore, Present, PresentId, PresentStatus};
