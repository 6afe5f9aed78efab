//! In-memory chain for tests
//!
//! Scripted head, block timestamps, contract logs and present snapshots, with
//! failure injection and call counters.

use async_trait::async_trait;
use primitive_types::U256;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::chain::{LogSource, PresentReader, RawLog, SourceError, SourceResult};
use crate::events::EventKind;
use crate::store::{Asset, PresentDetails, PresentId, ZERO_ADDRESS};

pub const CONTRACT: &str = "0x3b3cf7ee8dbcddd8b8451e38269d982f351ca3db";

#[derive(Default)]
struct ChainState {
    head: u64,
    timestamps: HashMap<u64, u64>,
    logs: Vec<RawLog>,
    details: HashMap<PresentId, PresentDetails>,
    fail_head: bool,
    fail_details: bool,
    failing_timestamps: HashSet<u64>,
    /// Errors returned, one per call, for pages starting at a block
    page_errors: HashMap<u64, VecDeque<SourceError>>,
    /// Pages that always fail
    broken_pages: HashSet<u64>,
    requested_ranges: Vec<(u64, u64)>,
    /// Simulated round trip of `get_logs`
    log_latency: Duration,
}

#[derive(Default)]
pub struct MemoryChain {
    state: RwLock<ChainState>,
    log_calls: AtomicUsize,
    timestamp_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    logs_in_flight: AtomicUsize,
    peak_logs_in_flight: AtomicUsize,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain with blocks `0..=head`, block `i` stamped `start + i * step`
    pub async fn with_linear_timestamps(head: u64, start: u64, step: u64) -> Self {
        let chain = Self::new();
        {
            let mut state = chain.state.write().await;
            state.head = head;
            for block in 0..=head {
                state.timestamps.insert(block, start + block * step);
            }
        }
        chain
    }

    pub async fn set_head(&self, head: u64) {
        self.state.write().await.head = head;
    }

    pub async fn push_log(&self, log: RawLog) {
        self.state.write().await.logs.push(log);
    }

    pub async fn set_details(&self, id: &PresentId, details: PresentDetails) {
        self.state.write().await.details.insert(id.clone(), details);
    }

    pub async fn fail_head(&self, fail: bool) {
        self.state.write().await.fail_head = fail;
    }

    pub async fn fail_details(&self, fail: bool) {
        self.state.write().await.fail_details = fail;
    }

    pub async fn fail_timestamp(&self, block: u64) {
        self.state.write().await.failing_timestamps.insert(block);
    }

    /// Queue one error for the next fetch of the page starting at `from_block`
    pub async fn queue_page_error(&self, from_block: u64, error: SourceError) {
        self.state
            .write()
            .await
            .page_errors
            .entry(from_block)
            .or_default()
            .push_back(error);
    }

    pub async fn break_page(&self, from_block: u64) {
        self.state.write().await.broken_pages.insert(from_block);
    }

    pub async fn heal_page(&self, from_block: u64) {
        self.state.write().await.broken_pages.remove(&from_block);
    }

    pub async fn set_log_latency(&self, latency: Duration) {
        self.state.write().await.log_latency = latency;
    }

    pub async fn requested_ranges(&self) -> Vec<(u64, u64)> {
        let mut ranges = self.state.read().await.requested_ranges.clone();
        ranges.sort();
        ranges
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    pub fn timestamp_calls(&self) -> usize {
        self.timestamp_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    /// Most `get_logs` calls that were in flight at the same time
    pub fn peak_logs_in_flight(&self) -> usize {
        self.peak_logs_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSource for MemoryChain {
    async fn current_block(&self) -> SourceResult<u64> {
        let state = self.state.read().await;
        if state.fail_head {
            return Err(SourceError::Unavailable("head unavailable".to_string()));
        }
        Ok(state.head)
    }

    async fn block_timestamp(&self, block: u64) -> SourceResult<u64> {
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        if state.failing_timestamps.contains(&block) {
            return Err(SourceError::Unavailable(format!("block {} timed out", block)));
        }
        state
            .timestamps
            .get(&block)
            .copied()
            .ok_or_else(|| SourceError::Unavailable(format!("block {} not found", block)))
    }

    async fn get_logs(
        &self,
        address: &str,
        from_block: u64,
        to_block: u64,
        topics: Option<&[String]>,
    ) -> SourceResult<Vec<RawLog>> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.logs_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_logs_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let latency = self.state.read().await.log_latency;
        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }
        self.logs_in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.write().await;
        state.requested_ranges.push((from_block, to_block));

        if let Some(error) = state.page_errors.get_mut(&from_block).and_then(|q| q.pop_front()) {
            return Err(error);
        }
        if state.broken_pages.contains(&from_block) {
            return Err(SourceError::Unavailable(format!("page {} failed", from_block)));
        }

        Ok(state
            .logs
            .iter()
            .filter(|log| log.address.eq_ignore_ascii_case(address))
            .filter(|log| (from_block..=to_block).contains(&log.block_number))
            .filter(|log| match topics {
                Some(topics) => log.topics.first().is_some_and(|t| topics.contains(t)),
                None => true,
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PresentReader for MemoryChain {
    async fn present_details(&self, id: &PresentId) -> SourceResult<Option<PresentDetails>> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        if state.fail_details {
            return Err(SourceError::Unavailable("eth_call timed out".to_string()));
        }
        Ok(state.details.get(id).cloned())
    }
}

pub fn address_topic(address: &str) -> String {
    format!("0x{}{}", "00".repeat(12), address.trim_start_matches("0x"))
}

/// Pad a short id like `0xabc` to a full 32-byte word
pub fn present_word(id: &str) -> String {
    format!("0x{:0>64}", id.trim_start_matches("0x"))
}

/// Contract log for a present event
pub fn present_log(kind: EventKind, id: &str, actor: &str, block: u64, log_index: u64) -> RawLog {
    RawLog {
        address: CONTRACT.to_string(),
        topics: vec![kind.topic().to_string(), present_word(id), address_topic(actor)],
        data: "0x".to_string(),
        block_number: block,
        block_hash: None,
        transaction_hash: Some(format!("0x{:064x}", block * 1_000 + log_index)),
        log_index,
    }
}

pub fn details_for(sender: &str) -> PresentDetails {
    PresentDetails {
        sender: sender.to_string(),
        recipients: vec!["0x2222222222222222222222222222222222222222".to_string()],
        assets: vec![Asset::new(ZERO_ADDRESS, U256::from(100_000_000_000_000_000u64))],
        message: "Happy birthday".to_string(),
        metadata: "{\"theme\":\"cake\"}".to_string(),
        status: 0,
        expiry_time: 0,
    }
}
