//! Block Range Resolver
//!
//! Converts a wall-clock range `[from_time, to_time]` (unix seconds) into an
//! inclusive block range by binary search over block timestamps:
//!
//! - `from_block`: earliest block with `timestamp >= from_time`
//! - `to_block`: latest block with `timestamp <= to_time`, searched from
//!   `from_block` upwards
//!
//! Probes are sequential. The first failed timestamp read ends that search
//! with a constant-block-time estimate and marks the result approximate.

use chrono::Utc;
use std::sync::Arc;

use crate::chain::LogSource;
use crate::indexer::IndexError;

/// Resolved block range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub from_block: u64,
    pub to_block: u64,
    /// True when either bound came from the block-time estimate
    pub approximate: bool,
}

impl ResolvedRange {
    /// Range to scan; near the head the upper bound can fall below the lower
    pub fn scan_range(&self) -> (u64, u64) {
        (self.from_block, self.from_block.max(self.to_block))
    }
}

pub struct BlockRangeResolver {
    source: Arc<dyn LogSource>,
    block_time_secs: u64,
}

impl BlockRangeResolver {
    pub fn new(source: Arc<dyn LogSource>, block_time_secs: u64) -> Self {
        Self {
            source,
            block_time_secs: block_time_secs.max(1),
        }
    }

    /// Resolve against the current head and wall clock
    pub async fn resolve(&self, from_time: u64, to_time: u64) -> Result<ResolvedRange, IndexError> {
        if from_time > to_time {
            return Err(IndexError::InvalidRange { from_time, to_time });
        }
        let current_block = self
            .source
            .current_block()
            .await
            .map_err(IndexError::HeadUnavailable)?;
        let now = Utc::now().timestamp().max(0) as u64;
        self.resolve_with_head(from_time, to_time, current_block, now).await
    }

    /// Resolve against a known head block and clock
    pub async fn resolve_with_head(
        &self,
        from_time: u64,
        to_time: u64,
        current_block: u64,
        now: u64,
    ) -> Result<ResolvedRange, IndexError> {
        if from_time > to_time {
            return Err(IndexError::InvalidRange { from_time, to_time });
        }
        let to_time = to_time.min(now);

        let (from_block, lower_estimated) = self.search_lower(from_time, current_block, now).await;
        let (to_block, upper_estimated) = self
            .search_upper(to_time, from_block, current_block, now)
            .await;

        let range = ResolvedRange {
            from_block,
            to_block,
            approximate: lower_estimated || upper_estimated,
        };
        tracing::debug!(
            from_time,
            to_time,
            from_block = range.from_block,
            to_block = range.to_block,
            approximate = range.approximate,
            "Resolved time range to blocks"
        );
        Ok(range)
    }

    /// Earliest block with `timestamp >= target`, or `current_block` if none
    async fn search_lower(&self, target: u64, current_block: u64, now: u64) -> (u64, bool) {
        let (mut left, mut right) = (0u64, current_block);
        let mut found = current_block;

        while left <= right {
            let mid = left + (right - left) / 2;
            match self.source.block_timestamp(mid).await {
                Ok(ts) if ts >= target => {
                    found = mid;
                    if mid == 0 {
                        break;
                    }
                    right = mid - 1;
                }
                Ok(_) => left = mid + 1,
                Err(e) => {
                    let estimate = self.estimate_block(target, current_block, now);
                    tracing::warn!(block = mid, error = %e, estimate, "Timestamp probe failed, using block-time estimate");
                    return (estimate, true);
                }
            }
        }
        (found, false)
    }

    /// Latest block in `[floor, current_block]` with `timestamp <= target`, or
    /// `floor` if none
    async fn search_upper(&self, target: u64, floor: u64, current_block: u64, now: u64) -> (u64, bool) {
        let (mut left, mut right) = (floor, current_block);
        let mut found = floor;

        while left <= right {
            let mid = left + (right - left) / 2;
            match self.source.block_timestamp(mid).await {
                Ok(ts) if ts <= target => {
                    found = mid;
                    left = mid + 1;
                }
                Ok(_) => {
                    if mid == 0 {
                        break;
                    }
                    right = mid - 1;
                }
                Err(e) => {
                    let estimate = self.estimate_block(target, current_block, now).max(floor);
                    tracing::warn!(block = mid, error = %e, estimate, "Timestamp probe failed, using block-time estimate");
                    return (estimate, true);
                }
            }
        }
        (found, false)
    }

    /// `current - ceil((now - target) / block_time)`, clamped to `[0, current]`
    fn estimate_block(&self, target: u64, current_block: u64, now: u64) -> u64 {
        let behind = now.saturating_sub(target).div_ceil(self.block_time_secs);
        current_block.saturating_sub(behind)
    }
}
