//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ApiConfig;
use crate::indexer::{IndexController, TimeRangeSearch};
use crate::store::EntityStore;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Persistent present store, read by the query routes
    pub store: Arc<EntityStore>,
    /// Indexer, for status and reindex
    pub controller: Arc<IndexController>,
    /// Ad-hoc time-range search
    pub search: Arc<TimeRangeSearch>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        controller: Arc<IndexController>,
        search: Arc<TimeRangeSearch>,
        config: ApiConfig,
    ) -> Self {
        Self {
            store: controller.store().clone(),
            controller,
            search,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
