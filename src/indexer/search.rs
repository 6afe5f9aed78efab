//! Time-range search
//!
//! Ad-hoc historical query independent of the persistent store: resolve the
//! time range to blocks, fetch and classify the logs, and fold them into an
//! ephemeral [`EntityStore`]. Complete results are cached by block range.

use std::sync::Arc;

use super::error::IndexResult;
use crate::cache::{CacheConfig, RangeCache};
use crate::chain::{LogSource, PresentReader};
use crate::events::{classify_all, ChainEvent, EventKind};
use crate::fetcher::{BlockPage, FetchConfig, PaginatedLogFetcher};
use crate::resolver::{BlockRangeResolver, ResolvedRange};
use crate::store::{EntityStore, Present};

/// Number of events of each kind in a result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub wrapped: usize,
    pub unwrapped: usize,
    pub taken_back: usize,
}

impl EventCounts {
    pub fn from_events(events: &[ChainEvent]) -> Self {
        events.iter().fold(Self::default(), |mut counts, e| {
            match e.event.kind() {
                EventKind::Wrapped => counts.wrapped += 1,
                EventKind::Unwrapped => counts.unwrapped += 1,
                EventKind::TakenBack => counts.taken_back += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.wrapped + self.unwrapped + self.taken_back
    }
}

/// How the logs were fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchStats {
    pub pages: usize,
    pub failed_pages: Vec<BlockPage>,
    pub workers: usize,
    pub inter_batch_delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub from_time: u64,
    pub to_time: u64,
    pub range: ResolvedRange,
    pub counts: EventCounts,
    /// Events in chain order
    pub events: Vec<ChainEvent>,
    /// Presents reconstructed from `events` alone
    pub presents: Vec<Present>,
    pub fetch: FetchStats,
    /// Whether the result was served from the range cache
    pub cached: bool,
}

pub struct TimeRangeSearch {
    resolver: BlockRangeResolver,
    fetcher: PaginatedLogFetcher,
    reader: Arc<dyn PresentReader>,
    cache: RangeCache<SearchResult>,
    contract_address: String,
}

impl TimeRangeSearch {
    pub fn new(
        source: Arc<dyn LogSource>,
        reader: Arc<dyn PresentReader>,
        contract_address: impl Into<String>,
        block_time_secs: u64,
        fetch_config: FetchConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            resolver: BlockRangeResolver::new(source.clone(), block_time_secs),
            fetcher: PaginatedLogFetcher::new(source, fetch_config),
            reader,
            cache: RangeCache::new(cache_config),
            contract_address: contract_address.into(),
        }
    }

    pub fn cache(&self) -> &RangeCache<SearchResult> {
        &self.cache
    }

    /// Presents and events emitted between two unix timestamps
    pub async fn search(&self, from_time: u64, to_time: u64) -> IndexResult<SearchResult> {
        let range = self.resolver.resolve(from_time, to_time).await?;
        let key = range.scan_range();

        if let Some(mut hit) = self.cache.get(key).await {
            tracing::debug!(from_block = key.0, to_block = key.1, "Search served from cache");
            hit.from_time = from_time;
            hit.to_time = to_time;
            hit.cached = true;
            return Ok(hit);
        }

        let outcome = self
            .fetcher
            .fetch(&self.contract_address, key.0, key.1)
            .await;
        let mut events = classify_all(&outcome.logs);
        events.sort_by_key(|e| e.position);

        let scratch = EntityStore::new();
        scratch
            .apply_batch(events.clone(), Some(self.reader.as_ref()))
            .await;

        let config = self.fetcher.config();
        let result = SearchResult {
            from_time,
            to_time,
            range,
            counts: EventCounts::from_events(&events),
            events,
            presents: scratch.all().await,
            fetch: FetchStats {
                pages: outcome.pages,
                failed_pages: outcome.failed_pages.iter().map(|f| f.page).collect(),
                workers: config.max_concurrent_workers,
                inter_batch_delay_ms: config.inter_batch_delay.as_millis() as u64,
            },
            cached: false,
        };

        tracing::info!(
            from_block = key.0,
            to_block = key.1,
            approximate = range.approximate,
            events = result.counts.total(),
            presents = result.presents.len(),
            failed_pages = result.fetch.failed_pages.len(),
            "Time-range search complete"
        );

        // Partial results are not cached so the gap is retried next time
        if outcome.failed_pages.is_empty() {
            self.cache.insert(key, result.clone()).await;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::IndexError;
    use crate::store::{PresentId, PresentStatus};
    use crate::testing::{details_for, present_log, present_word, MemoryChain};
    use chrono::Utc;
    use std::time::Duration;

    const SENDER: &str = "0x1111111111111111111111111111111111111111";
    const TAKER: &str = "0x2222222222222222222222222222222222222222";
    const BASE: u64 = 1_700_000_000;

    /// 2000 blocks, two seconds apart
    async fn chain() -> Arc<MemoryChain> {
        let chain = Arc::new(MemoryChain::with_linear_timestamps(1999, BASE, 2).await);
        chain.push_log(present_log(EventKind::Wrapped, "0x01", SENDER, 100, 0)).await;
        chain.push_log(present_log(EventKind::Wrapped, "0x02", SENDER, 900, 2)).await;
        chain.push_log(present_log(EventKind::Unwrapped, "0x02", TAKER, 950, 0)).await;
        chain.push_log(present_log(EventKind::Unwrapped, "0x03", TAKER, 960, 0)).await;
        chain.push_log(present_log(EventKind::Wrapped, "0x04", SENDER, 1500, 0)).await;
        chain
    }

    fn search(chain: &Arc<MemoryChain>) -> TimeRangeSearch {
        TimeRangeSearch::new(
            chain.clone(),
            chain.clone(),
            crate::testing::CONTRACT,
            2,
            FetchConfig {
                inter_batch_delay: Duration::ZERO,
                ..Default::default()
            },
            CacheConfig::default(),
        )
    }

    fn ts(block: u64) -> u64 {
        BASE + block * 2
    }

    #[tokio::test]
    async fn test_search_folds_events_in_range() {
        let chain = chain().await;
        chain.set_details(&PresentId::new(present_word("0x02")), details_for(SENDER)).await;

        let result = search(&chain).search(ts(800), ts(1000)).await.unwrap();

        assert_eq!((result.range.from_block, result.range.to_block), (800, 1000));
        assert!(!result.range.approximate);
        assert_eq!(result.counts.wrapped, 1);
        assert_eq!(result.counts.unwrapped, 2);
        assert_eq!(result.counts.total(), 3);
        assert!(result.events.windows(2).all(|w| w[0].position <= w[1].position));

        // 0x03 was wrapped outside the range, so only 0x02 is reconstructed
        assert_eq!(result.presents.len(), 1);
        let present = &result.presents[0];
        assert_eq!(present.status, PresentStatus::Unwrapped);
        assert!(present.enriched);
        assert_eq!(result.fetch.pages, 1);
        assert!(!result.cached);
    }

    #[tokio::test]
    async fn test_repeated_search_hits_cache() {
        let chain = chain().await;
        let search = search(&chain);

        search.search(ts(0), ts(1999)).await.unwrap();
        let calls = chain.log_calls();
        let detail_calls = chain.detail_calls();
        assert_eq!(detail_calls, 3);

        let again = search.search(ts(0), ts(1999)).await.unwrap();
        assert!(again.cached);
        assert_eq!(chain.log_calls(), calls);
        assert_eq!(chain.detail_calls(), detail_calls);
        assert_eq!(again.presents.len(), 3);
    }

    #[tokio::test]
    async fn test_partial_results_are_not_cached() {
        let chain = chain().await;
        chain.break_page(500).await;
        let search = search(&chain);

        let result = search.search(ts(0), ts(1999)).await.unwrap();
        assert_eq!(result.fetch.failed_pages.len(), 1);
        assert_eq!(search.cache().stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_invalid_range() {
        let chain = chain().await;
        let err = search(&chain).search(ts(10), ts(5)).await.unwrap_err();
        assert!(matches!(err, IndexError::InvalidRange { .. }));
    }

    #[tokio::test]
    async fn test_future_end_is_clamped() {
        let chain = chain().await;
        let now = Utc::now().timestamp() as u64;
        let result = search(&chain).search(ts(1400), now + 86_400).await.unwrap();
        assert_eq!(result.range.to_block, 1999);
        assert_eq!(result.counts.wrapped, 1);
    }
}
