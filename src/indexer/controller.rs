//! Index Controller
//!
//! Drives the persistent EntityStore: a one-shot backfill from the deployment
//! block, a periodic incremental poll, and an administrative reindex. Every
//! writer takes the same async mutex, so a reindex waits for an in-flight poll
//! cycle to finish instead of interleaving with it.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{IndexError, IndexResult};
use crate::chain::{LogSource, PresentReader};
use crate::events::classify_all;
use crate::fetcher::{FetchConfig, PaginatedLogFetcher};
use crate::store::{BatchSummary, EntityStore};

/// Controller settings
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Present contract whose logs are indexed
    pub contract_address: String,
    /// Deployment block; backfill starts here
    pub start_block: u64,
    pub poll_interval: Duration,
    /// Max presents whose enrichment is retried per poll
    pub enrichment_batch: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            contract_address: "0x3b3cf7ee8dbcddd8b8451e38269d982f351ca3db".to_string(),
            start_block: 182_490_804,
            poll_interval: Duration::from_secs(300),
            enrichment_batch: 25,
        }
    }
}

/// Lifecycle phase of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPhase {
    Idle,
    Backfilling,
    Polling,
    Reindexing,
    Stopped,
}

impl std::fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IndexPhase::Idle => "idle",
            IndexPhase::Backfilling => "backfilling",
            IndexPhase::Polling => "polling",
            IndexPhase::Reindexing => "reindexing",
            IndexPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Summary of one backfill, poll or reindex cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub from_block: u64,
    pub to_block: u64,
    pub pages: usize,
    pub failed_pages: usize,
    pub logs: usize,
    pub events: usize,
    pub applied: BatchSummary,
    /// Presents enriched by the deferred-enrichment pass
    pub enriched: usize,
    /// Cursor after the cycle
    pub last_processed_block: u64,
}

pub struct IndexController {
    source: Arc<dyn LogSource>,
    reader: Arc<dyn PresentReader>,
    store: Arc<EntityStore>,
    fetcher: PaginatedLogFetcher,
    config: IndexerConfig,
    phase: RwLock<IndexPhase>,
    /// Single-writer guard over the store
    write_lock: Mutex<()>,
    shutdown: CancellationToken,
    started: AtomicBool,
}

impl IndexController {
    pub fn new(
        source: Arc<dyn LogSource>,
        reader: Arc<dyn PresentReader>,
        store: Arc<EntityStore>,
        fetch_config: FetchConfig,
        config: IndexerConfig,
    ) -> Self {
        let fetcher = PaginatedLogFetcher::new(source.clone(), fetch_config);
        Self {
            source,
            reader,
            store,
            fetcher,
            config,
            phase: RwLock::new(IndexPhase::Idle),
            write_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub async fn phase(&self) -> IndexPhase {
        *self.phase.read().await
    }

    async fn set_phase(&self, phase: IndexPhase) {
        let mut current = self.phase.write().await;
        if *current != IndexPhase::Stopped {
            *current = phase;
        }
    }

    async fn head(&self) -> IndexResult<u64> {
        self.source
            .current_block()
            .await
            .map_err(IndexError::HeadUnavailable)
    }

    /// Full historical scan from the configured start block to the head
    ///
    /// On failure the phase returns to `Idle`; the first successful poll
    /// then completes the scan and moves to `Polling`.
    pub async fn backfill(&self) -> IndexResult<CycleReport> {
        let _guard = self.write_lock.lock().await;
        let previous = self.phase().await;
        self.set_phase(IndexPhase::Backfilling).await;

        let head = match self.head().await {
            Ok(head) => head,
            Err(e) => {
                self.set_phase(previous).await;
                return Err(e);
            }
        };
        let report = self.run_range(self.config.start_block, head).await;

        self.set_phase(IndexPhase::Polling).await;
        tracing::info!(
            from_block = report.from_block,
            to_block = report.to_block,
            created = report.applied.created,
            failed_pages = report.failed_pages,
            "Backfill complete"
        );
        Ok(report)
    }

    /// Fetch `[cursor + 1, head]`, apply it, then retry pending enrichments
    pub async fn poll_once(&self) -> IndexResult<CycleReport> {
        let _guard = self.write_lock.lock().await;
        let head = self.head().await?;

        let cursor = self.store.last_processed_block().await;
        let from_block = cursor.saturating_add(1).max(self.config.start_block);

        let mut report = if from_block > head {
            tracing::debug!(cursor, head, "No new blocks");
            CycleReport {
                from_block,
                to_block: head,
                last_processed_block: cursor,
                ..Default::default()
            }
        } else {
            self.run_range(from_block, head).await
        };

        report.enriched = self.retry_enrichment().await;

        // A poll after a failed backfill has covered the backfill range
        if self.phase().await == IndexPhase::Idle {
            self.set_phase(IndexPhase::Polling).await;
        }

        if report.events > 0 || report.failed_pages > 0 || report.enriched > 0 {
            tracing::info!(
                from_block = report.from_block,
                to_block = report.to_block,
                events = report.events,
                created = report.applied.created,
                transitioned = report.applied.transitioned,
                enriched = report.enriched,
                failed_pages = report.failed_pages,
                "Poll cycle complete"
            );
        }
        Ok(report)
    }

    /// Rewind the cursor to `from_block - 1` and rescan up to the head
    ///
    /// Waits for any in-flight cycle. Replayed events are no-ops in the store,
    /// so overlapping ranges leave existing state untouched.
    pub async fn reindex_from_block(&self, from_block: u64) -> IndexResult<CycleReport> {
        let _guard = self.write_lock.lock().await;
        let previous = self.phase().await;
        self.set_phase(IndexPhase::Reindexing).await;

        tracing::info!(from_block, "Reindex requested");
        let result = match self.head().await {
            Ok(head) => {
                self.store.reset_cursor(from_block.saturating_sub(1)).await;
                Ok(self.run_range(from_block, head).await)
            }
            Err(e) => Err(e),
        };

        let resume = match previous {
            IndexPhase::Idle => IndexPhase::Idle,
            _ => IndexPhase::Polling,
        };
        self.set_phase(resume).await;

        let report = result?;
        tracing::info!(
            from_block = report.from_block,
            to_block = report.to_block,
            events = report.events,
            last_processed_block = report.last_processed_block,
            "Reindex complete"
        );
        Ok(report)
    }

    /// Fetch, classify and apply one range; caller holds the write lock
    async fn run_range(&self, from_block: u64, to_block: u64) -> CycleReport {
        self.store.set_indexing(true).await;

        let outcome = self
            .fetcher
            .fetch(&self.config.contract_address, from_block, to_block)
            .await;
        let events = classify_all(&outcome.logs);
        let event_count = events.len();
        let applied = self
            .store
            .apply_batch(events, Some(self.reader.as_ref()))
            .await;

        // Stop short of the earliest failed page so the next poll refetches it
        let target = match outcome.earliest_failed_block() {
            Some(failed) => failed.saturating_sub(1),
            None => to_block,
        };
        let last_processed_block = self.store.advance_cursor(target).await;
        self.store.set_indexing(false).await;

        CycleReport {
            from_block,
            to_block,
            pages: outcome.pages,
            failed_pages: outcome.failed_pages.len(),
            logs: outcome.logs.len(),
            events: event_count,
            applied,
            enriched: 0,
            last_processed_block,
        }
    }

    /// Retry snapshot reads for presents created without one
    async fn retry_enrichment(&self) -> usize {
        let pending = self.store.pending_enrichment(self.config.enrichment_batch).await;
        let mut enriched = 0;

        for id in pending {
            match self.reader.present_details(&id).await {
                Ok(Some(details)) => {
                    if self.store.enrich(&id, details).await {
                        enriched += 1;
                    }
                }
                Ok(None) => tracing::debug!(present_id = %id, "Present still unknown to contract"),
                Err(e) => {
                    tracing::debug!(present_id = %id, error = %e, "Enrichment retry failed");
                    if e.is_rate_limited() {
                        break;
                    }
                }
            }
        }
        enriched
    }

    /// Spawn the background task: backfill once, then poll every interval
    /// until [`IndexController::stop`] is called
    pub fn start(self: Arc<Self>) -> IndexResult<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(IndexError::AlreadyRunning);
        }

        tracing::info!(
            start_block = self.config.start_block,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            contract = %self.config.contract_address,
            "Starting indexer"
        );

        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                result = self.backfill() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Backfill failed, polling will resume from the cursor");
                    }
                }
            }

            let mut ticker = tokio::time::interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll_once().await {
                            tracing::error!(error = %e, "Poll cycle failed, retrying next tick");
                        }
                    }
                }
            }

            *self.phase.write().await = IndexPhase::Stopped;
            self.store.set_indexing(false).await;
            tracing::info!("Indexer stopped");
        }))
    }

    /// Signal the background task to stop after its current step
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::SourceError;
    use crate::events::EventKind;
    use crate::store::{PresentId, PresentStatus};
    use crate::testing::{details_for, present_log, present_word, MemoryChain};

    const SENDER: &str = "0x1111111111111111111111111111111111111111";
    const TAKER: &str = "0x2222222222222222222222222222222222222222";

    fn id(short: &str) -> PresentId {
        PresentId::new(present_word(short))
    }

    fn controller(chain: &Arc<MemoryChain>, start_block: u64) -> Arc<IndexController> {
        let fetch = FetchConfig {
            inter_batch_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            ..Default::default()
        };
        let config = IndexerConfig {
            contract_address: crate::testing::CONTRACT.to_string(),
            start_block,
            poll_interval: Duration::from_secs(3600),
            enrichment_batch: 25,
        };
        Arc::new(IndexController::new(
            chain.clone(),
            chain.clone(),
            Arc::new(EntityStore::new()),
            fetch,
            config,
        ))
    }

    async fn seeded_chain() -> Arc<MemoryChain> {
        let chain = Arc::new(MemoryChain::new());
        chain.set_head(1000).await;
        chain.push_log(present_log(EventKind::Wrapped, "0xabc", SENDER, 120, 0)).await;
        chain.push_log(present_log(EventKind::Unwrapped, "0xabc", TAKER, 700, 3)).await;
        chain.push_log(present_log(EventKind::Wrapped, "0xdef", SENDER, 650, 1)).await;
        chain
    }

    #[tokio::test]
    async fn test_backfill_indexes_history() {
        let chain = seeded_chain().await;
        let controller = controller(&chain, 100);

        let report = controller.backfill().await.unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.events, 3);
        assert_eq!(report.applied.created, 2);
        assert_eq!(report.last_processed_block, 1000);

        let store = controller.store();
        assert_eq!(store.get(&id("0xabc")).await.unwrap().status, PresentStatus::Unwrapped);
        assert_eq!(store.get(&id("0xdef")).await.unwrap().status, PresentStatus::Active);

        let status = store.status().await;
        assert_eq!(status.total_entities, 2);
        assert_eq!(status.total_events_applied, 3);
        assert!(!status.is_indexing);
        assert_eq!(controller.phase().await, IndexPhase::Polling);
    }

    #[tokio::test]
    async fn test_poll_fetches_only_new_blocks() {
        let chain = seeded_chain().await;
        let controller = controller(&chain, 100);
        controller.backfill().await.unwrap();

        let calls = chain.log_calls();
        let idle = controller.poll_once().await.unwrap();
        assert_eq!(idle.events, 0);
        assert_eq!(chain.log_calls(), calls);

        chain.push_log(present_log(EventKind::TakenBack, "0xdef", SENDER, 1100, 0)).await;
        chain.set_head(1200).await;
        let report = controller.poll_once().await.unwrap();

        assert_eq!((report.from_block, report.to_block), (1001, 1200));
        assert_eq!(report.applied.transitioned, 1);
        assert_eq!(report.last_processed_block, 1200);
        assert_eq!(
            controller.store().get(&id("0xdef")).await.unwrap().status,
            PresentStatus::TakenBack
        );
    }

    #[tokio::test]
    async fn test_failed_page_holds_cursor_until_refetched() {
        let chain = seeded_chain().await;
        chain.break_page(600).await;
        let controller = controller(&chain, 100);

        // Pages: [100, 599] ok, [600, 1000] fails
        let report = controller.backfill().await.unwrap();
        assert_eq!(report.failed_pages, 1);
        assert_eq!(report.last_processed_block, 599);
        assert!(controller.store().get(&id("0xdef")).await.is_none());

        chain.heal_page(600).await;
        let report = controller.poll_once().await.unwrap();
        assert_eq!(report.from_block, 600);
        assert_eq!(report.last_processed_block, 1000);
        assert_eq!(
            controller.store().get(&id("0xabc")).await.unwrap().status,
            PresentStatus::Unwrapped
        );
        assert!(controller.store().get(&id("0xdef")).await.is_some());
    }

    #[tokio::test]
    async fn test_reindex_twice_is_identical() {
        let chain = seeded_chain().await;
        let controller = controller(&chain, 100);
        controller.backfill().await.unwrap();

        controller.reindex_from_block(500).await.unwrap();
        let once = controller.store().all().await;
        let once_status = controller.store().status().await;

        let report = controller.reindex_from_block(500).await.unwrap();
        assert_eq!(report.from_block, 500);
        assert_eq!(report.applied.created, 0);
        assert_eq!(report.applied.transitioned, 0);

        assert_eq!(controller.store().all().await, once);
        assert_eq!(controller.store().status().await, once_status);
        assert_eq!(once_status.last_processed_block, 1000);
        assert_eq!(controller.phase().await, IndexPhase::Polling);
    }

    #[tokio::test]
    async fn test_reindex_rewinds_cursor() {
        let chain = seeded_chain().await;
        let controller = controller(&chain, 100);
        controller.backfill().await.unwrap();

        chain.break_page(900).await;
        let report = controller.reindex_from_block(900).await.unwrap();
        assert_eq!(report.failed_pages, 1);
        assert_eq!(report.last_processed_block, 899);
    }

    #[tokio::test]
    async fn test_head_failure_is_reported_not_fatal() {
        let chain = seeded_chain().await;
        let controller = controller(&chain, 100);
        chain.fail_head(true).await;

        assert!(matches!(
            controller.poll_once().await,
            Err(IndexError::HeadUnavailable(SourceError::Unavailable(_)))
        ));
        assert!(controller.backfill().await.is_err());
        assert_eq!(controller.phase().await, IndexPhase::Idle);

        chain.fail_head(false).await;
        assert_eq!(controller.poll_once().await.unwrap().last_processed_block, 1000);
    }

    #[tokio::test]
    async fn test_failed_backfill_stays_idle_until_first_poll() {
        let chain = seeded_chain().await;
        let controller = controller(&chain, 100);
        chain.fail_head(true).await;

        assert!(matches!(
            controller.backfill().await,
            Err(IndexError::HeadUnavailable(_))
        ));
        assert_eq!(controller.phase().await, IndexPhase::Idle);
        assert_eq!(controller.store().last_processed_block().await, 0);

        // A failed poll does not promote either
        assert!(controller.poll_once().await.is_err());
        assert_eq!(controller.phase().await, IndexPhase::Idle);

        chain.fail_head(false).await;
        let report = controller.poll_once().await.unwrap();
        assert_eq!(report.from_block, 100);
        assert_eq!(report.applied.created, 2);
        assert_eq!(controller.phase().await, IndexPhase::Polling);
    }

    #[tokio::test]
    async fn test_deferred_enrichment() {
        let chain = seeded_chain().await;
        chain.fail_details(true).await;
        let controller = controller(&chain, 100);

        let report = controller.backfill().await.unwrap();
        assert_eq!(report.applied.enrichment_failures, 2);
        assert!(!controller.store().get(&id("0xabc")).await.unwrap().enriched);

        chain.fail_details(false).await;
        chain.set_details(&id("0xabc"), details_for(SENDER)).await;
        let report = controller.poll_once().await.unwrap();

        assert_eq!(report.enriched, 1);
        let present = controller.store().get(&id("0xabc")).await.unwrap();
        assert!(present.enriched);
        assert_eq!(present.status, PresentStatus::Unwrapped);
        assert_eq!(controller.store().pending_enrichment(10).await, vec![id("0xdef")]);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let chain = seeded_chain().await;
        let controller = controller(&chain, 100);

        let handle = controller.clone().start().unwrap();
        assert!(matches!(controller.clone().start(), Err(IndexError::AlreadyRunning)));

        // Concurrent reindex waits for the backfill to release the store
        controller.reindex_from_block(100).await.unwrap();
        assert_eq!(controller.store().status().await.total_entities, 2);

        controller.stop();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(controller.phase().await, IndexPhase::Stopped);
    }
}
