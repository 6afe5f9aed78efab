//! Paginated Log Fetcher
//!
//! Splits an inclusive block range into fixed-size pages and fetches them from
//! a [`LogSource`] with bounded concurrency:
//!
//! ```text
//! [from ............................................. to]
//!  | page | page | page | page | page | page | page |
//!  \______ chunk (N workers) ____/\____ chunk ______/
//!            join_all  -> sleep(inter_batch_delay) -> join_all
//! ```
//!
//! A failing page contributes no logs and is reported in
//! [`FetchOutcome::failed_pages`]; it never aborts sibling pages or later
//! chunks. Rate-limited pages are retried a fixed number of times after a
//! fixed delay. The merged logs are unordered.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{LogSource, RawLog, SourceError};

/// Fetcher tuning
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum blocks per `eth_getLogs` call
    pub page_size: u64,
    /// Pages fetched concurrently per chunk
    pub max_concurrent_workers: usize,
    /// Pause between chunks
    pub inter_batch_delay: Duration,
    /// Extra attempts for a rate-limited page
    pub rate_limit_retries: u32,
    /// Pause before retrying a rate-limited page
    pub retry_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            max_concurrent_workers: 5,
            inter_batch_delay: Duration::from_millis(300),
            rate_limit_retries: 2,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// One inclusive page of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockPage {
    pub from_block: u64,
    pub to_block: u64,
}

/// A page that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub page: BlockPage,
    pub error: SourceError,
    pub attempts: u32,
}

/// Merged result of a paginated fetch
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Logs from every successful page, unordered
    pub logs: Vec<RawLog>,
    /// Number of pages the range was split into
    pub pages: usize,
    pub failed_pages: Vec<PageFailure>,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed_pages.is_empty()
    }

    /// First block of the earliest failed page
    pub fn earliest_failed_block(&self) -> Option<u64> {
        self.failed_pages.iter().map(|f| f.page.from_block).min()
    }
}

/// Split `[from_block, to_block]` into inclusive pages of at most `page_size`
/// blocks. An inverted range yields no pages.
pub fn partition_pages(from_block: u64, to_block: u64, page_size: u64) -> Vec<BlockPage> {
    let page_size = page_size.max(1);
    let mut pages = Vec::new();
    if from_block > to_block {
        return pages;
    }

    let mut start = from_block;
    loop {
        let end = start.saturating_add(page_size - 1).min(to_block);
        pages.push(BlockPage {
            from_block: start,
            to_block: end,
        });
        if end >= to_block {
            break;
        }
        start = end + 1;
    }
    pages
}

/// Bounded-concurrency paginated `getLogs`
pub struct PaginatedLogFetcher {
    source: Arc<dyn LogSource>,
    config: FetchConfig,
}

impl PaginatedLogFetcher {
    pub fn new(source: Arc<dyn LogSource>, config: FetchConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch every log emitted by `address` over `[from_block, to_block]`
    pub async fn fetch(&self, address: &str, from_block: u64, to_block: u64) -> FetchOutcome {
        let pages = partition_pages(from_block, to_block, self.config.page_size);
        let workers = self.config.max_concurrent_workers.max(1);
        let chunk_count = pages.len().div_ceil(workers);

        tracing::debug!(
            from_block,
            to_block,
            pages = pages.len(),
            workers,
            "Fetching logs"
        );

        let mut outcome = FetchOutcome {
            pages: pages.len(),
            ..Default::default()
        };

        for (index, chunk) in pages.chunks(workers).enumerate() {
            let results = join_all(chunk.iter().map(|page| self.fetch_page(address, *page))).await;

            for result in results {
                match result {
                    Ok(mut logs) => outcome.logs.append(&mut logs),
                    Err(failure) => {
                        tracing::warn!(
                            from_block = failure.page.from_block,
                            to_block = failure.page.to_block,
                            attempts = failure.attempts,
                            error = %failure.error,
                            "Page fetch failed, continuing with remaining pages"
                        );
                        outcome.failed_pages.push(failure);
                    }
                }
            }

            if index + 1 < chunk_count && !self.config.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }

        outcome.failed_pages.sort_by_key(|f| f.page);

        tracing::info!(
            from_block,
            to_block,
            pages = outcome.pages,
            failed_pages = outcome.failed_pages.len(),
            logs = outcome.logs.len(),
            "Log fetch finished"
        );

        outcome
    }

    async fn fetch_page(&self, address: &str, page: BlockPage) -> Result<Vec<RawLog>, PageFailure> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .source
                .get_logs(address, page.from_block, page.to_block, None)
                .await
            {
                Ok(logs) => {
                    tracing::debug!(
                        from_block = page.from_block,
                        to_block = page.to_block,
                        logs = logs.len(),
                        "Fetched page"
                    );
                    return Ok(logs);
                }
                Err(e) if e.is_rate_limited() && attempts <= self.config.rate_limit_retries => {
                    tracing::debug!(
                        from_block = page.from_block,
                        attempt = attempts,
                        "Rate limited, retrying page"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(error) => {
                    return Err(PageFailure {
                        page,
                        error,
                        attempts,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::testing::{present_log, MemoryChain, CONTRACT};

    const SENDER: &str = "0x1111111111111111111111111111111111111111";

    fn fetcher(chain: &Arc<MemoryChain>, config: FetchConfig) -> PaginatedLogFetcher {
        PaginatedLogFetcher::new(chain.clone(), config)
    }

    fn page(from_block: u64, to_block: u64) -> BlockPage {
        BlockPage { from_block, to_block }
    }

    #[test]
    fn test_partition_two_pages() {
        assert_eq!(
            partition_pages(1, 1000, 500),
            vec![page(1, 500), page(501, 1000)]
        );
        assert_eq!(
            partition_pages(0, 1000, 500),
            vec![page(0, 499), page(500, 999), page(1000, 1000)]
        );
    }

    #[test]
    fn test_partition_edges() {
        assert_eq!(partition_pages(7, 7, 500), vec![page(7, 7)]);
        assert!(partition_pages(10, 9, 500).is_empty());
        assert_eq!(partition_pages(0, 2, 0).len(), 3);
        assert_eq!(
            partition_pages(u64::MAX - 1, u64::MAX, 500),
            vec![page(u64::MAX - 1, u64::MAX)]
        );
    }

    #[tokio::test]
    async fn test_fetch_merges_pages() {
        let chain = Arc::new(MemoryChain::new());
        chain.push_log(present_log(EventKind::Wrapped, "0x01", SENDER, 10, 0)).await;
        chain.push_log(present_log(EventKind::Wrapped, "0x02", SENDER, 600, 0)).await;
        chain.push_log(present_log(EventKind::Wrapped, "0x03", SENDER, 2000, 0)).await;

        let outcome = fetcher(&chain, FetchConfig::default()).fetch(CONTRACT, 1, 1000).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.pages, 2);
        assert_eq!(outcome.logs.len(), 2);
        assert_eq!(chain.requested_ranges().await, vec![(1, 500), (501, 1000)]);
    }

    #[tokio::test]
    async fn test_failed_page_does_not_abort_siblings() {
        tokio::time::pause();
        let chain = Arc::new(MemoryChain::new());
        chain.push_log(present_log(EventKind::Wrapped, "0x01", SENDER, 10, 0)).await;
        chain.push_log(present_log(EventKind::Wrapped, "0x02", SENDER, 600, 0)).await;
        chain.push_log(present_log(EventKind::Wrapped, "0x03", SENDER, 1200, 0)).await;
        chain.break_page(501).await;

        let config = FetchConfig {
            max_concurrent_workers: 1,
            ..Default::default()
        };
        let outcome = fetcher(&chain, config).fetch(CONTRACT, 1, 1500).await;

        assert!(!outcome.is_complete());
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.logs.len(), 2);
        assert_eq!(outcome.failed_pages.len(), 1);
        assert_eq!(outcome.failed_pages[0].page, page(501, 1000));
        assert_eq!(outcome.earliest_failed_block(), Some(501));
    }

    #[tokio::test]
    async fn test_rate_limited_page_is_retried() {
        tokio::time::pause();
        let chain = Arc::new(MemoryChain::new());
        chain.push_log(present_log(EventKind::Wrapped, "0x01", SENDER, 10, 0)).await;
        chain.queue_page_error(1, SourceError::RateLimited).await;
        chain.queue_page_error(1, SourceError::RateLimited).await;

        let outcome = fetcher(&chain, FetchConfig::default()).fetch(CONTRACT, 1, 100).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.logs.len(), 1);
        assert_eq!(chain.log_calls(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_are_bounded() {
        tokio::time::pause();
        let chain = Arc::new(MemoryChain::new());
        for _ in 0..3 {
            chain.queue_page_error(1, SourceError::RateLimited).await;
        }

        let outcome = fetcher(&chain, FetchConfig::default()).fetch(CONTRACT, 1, 100).await;

        assert_eq!(outcome.failed_pages.len(), 1);
        assert_eq!(outcome.failed_pages[0].attempts, 3);
        assert_eq!(outcome.failed_pages[0].error, SourceError::RateLimited);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let chain = Arc::new(MemoryChain::new());
        chain
            .queue_page_error(1, SourceError::Unavailable("connection reset".into()))
            .await;

        let outcome = fetcher(&chain, FetchConfig::default()).fetch(CONTRACT, 1, 100).await;

        assert_eq!(outcome.failed_pages.len(), 1);
        assert_eq!(outcome.failed_pages[0].attempts, 1);
        assert_eq!(chain.log_calls(), 1);
    }

    #[tokio::test]
    async fn test_delay_only_between_chunks() {
        tokio::time::pause();
        let chain = Arc::new(MemoryChain::new());
        let config = FetchConfig {
            page_size: 10,
            max_concurrent_workers: 5,
            inter_batch_delay: Duration::from_millis(300),
            ..Default::default()
        };

        // 12 pages -> chunks of 5, 5, 2 -> two pauses
        let started = tokio::time::Instant::now();
        let outcome = fetcher(&chain, config).fetch(CONTRACT, 0, 119).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.pages, 12);
        assert_eq!(chain.log_calls(), 12);
        assert!(elapsed >= Duration::from_millis(600));
        assert!(elapsed < Duration::from_millis(900));
    }
    #[tokio::test]
    async fn test_in_flight_calls_bounded_by_workers() {
        tokio::time::pause();
        let chain = Arc::new(MemoryChain::new());
        chain.set_log_latency(Duration::from_millis(100)).await;
        let config = FetchConfig {
            page_size: 10,
            max_concurrent_workers: 5,
            inter_batch_delay: Duration::from_millis(300),
            ..Default::default()
        };

        // 12 pages -> chunks of 5, 5, 2, each chunk one round trip
        let started = tokio::time::Instant::now();
        let outcome = fetcher(&chain, config).fetch(CONTRACT, 0, 119).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.pages, 12);
        assert_eq!(chain.peak_logs_in_flight(), 5);
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_single_worker_fetches_sequentially() {
        tokio::time::pause();
        let chain = Arc::new(MemoryChain::new());
        chain.set_log_latency(Duration::from_millis(100)).await;
        let config = FetchConfig {
            page_size: 10,
            max_concurrent_workers: 1,
            inter_batch_delay: Duration::ZERO,
            ..Default::default()
        };

        let outcome = fetcher(&chain, config).fetch(CONTRACT, 0, 39).await;

        assert_eq!(outcome.pages, 4);
        assert_eq!(chain.peak_logs_in_flight(), 1);
    }
}
