//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON. Token amounts are
//! decimal strings; they exceed the safe integer range of JSON numbers.

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::events::ChainEvent;
use crate::indexer::{CycleReport, EventCounts, FetchStats, IndexPhase, SearchResult};
use crate::store::{Asset, Present, PresentStatus, StoreStatus};

/// Success envelope: `{ "success": true, "data": ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

// ============================================
// PRESENT DTOs
// ============================================

/// List query parameters
#[derive(Debug, Deserialize)]
pub struct ListPresentsParams {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDto {
    pub token: String,
    pub amount: String,
    pub token_type: u8,
}

impl From<&Asset> for AssetDto {
    fn from(asset: &Asset) -> Self {
        Self {
            token: asset.token.clone(),
            amount: asset.amount.to_string(),
            token_type: asset.token_type,
        }
    }
}

/// Present as seen by clients, with the read-time status projection applied
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentDto {
    pub id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub assets: Vec<AssetDto>,
    pub message: String,
    pub metadata: String,
    /// 0 Active, 1 Unwrapped, 2 Expired, 3 TakenBack
    pub status: u8,
    pub is_expired: bool,
    pub is_public: bool,
    pub expiry_time: Option<u64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub enriched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

impl PresentDto {
    pub fn from_present(present: &Present, now: u64) -> Self {
        let status = present.effective_status(now);
        let provenance = present.provenance.as_ref();
        Self {
            id: present.id.to_string(),
            sender: present.sender.clone(),
            recipients: present.recipients.clone(),
            assets: present.assets.iter().map(AssetDto::from).collect(),
            message: present.message.clone(),
            metadata: present.metadata.clone(),
            status: status.code(),
            is_expired: status == PresentStatus::Expired,
            is_public: present.is_public(),
            expiry_time: present.expiry_time,
            created_at: present.created_at,
            updated_at: present.updated_at,
            enriched: present.enriched,
            event_type: provenance.map(|p| p.event.to_string()),
            block_number: provenance.map(|p| p.block_number),
            transaction_hash: provenance.and_then(|p| p.transaction_hash.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PresentListResponse {
    pub presents: Vec<PresentDto>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

// ============================================
// INDEXER DTOs
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerStatusResponse {
    pub is_indexing: bool,
    pub last_processed_block: u64,
    pub total_entities: usize,
    pub total_events_applied: u64,
    pub phase: IndexPhase,
}

impl IndexerStatusResponse {
    pub fn new(status: StoreStatus, phase: IndexPhase) -> Self {
        Self {
            is_indexing: status.is_indexing,
            last_processed_block: status.last_processed_block,
            total_entities: status.total_entities,
            total_events_applied: status.total_events_applied,
            phase,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexRequest {
    #[serde(default)]
    pub from_block: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReportDto {
    pub from_block: u64,
    pub to_block: u64,
    pub pages: usize,
    pub failed_pages: usize,
    pub events: usize,
    pub created: usize,
    pub transitioned: usize,
    pub enrichment_failures: usize,
    /// Highest block among the applied events
    pub max_event_block: Option<u64>,
    pub last_processed_block: u64,
}

impl From<&CycleReport> for CycleReportDto {
    fn from(report: &CycleReport) -> Self {
        Self {
            from_block: report.from_block,
            to_block: report.to_block,
            pages: report.pages,
            failed_pages: report.failed_pages,
            events: report.events,
            created: report.applied.created,
            transitioned: report.applied.transitioned,
            enrichment_failures: report.applied.enrichment_failures,
            max_event_block: report.applied.max_block,
            last_processed_block: report.last_processed_block,
        }
    }
}

// ============================================
// SEARCH DTOs
// ============================================

/// Time-range search request; dates are RFC 3339
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchByTimeRequest {
    pub from_date: String,
    pub to_date: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCountsDto {
    pub wrap: usize,
    pub unwrap: usize,
    pub take_back: usize,
}

impl From<&EventCounts> for EventCountsDto {
    fn from(counts: &EventCounts) -> Self {
        Self {
            wrap: counts.wrapped,
            unwrap: counts.unwrapped,
            take_back: counts.taken_back,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    pub event_type: String,
    pub present_id: String,
    pub actor: String,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Option<String>,
}

impl From<&ChainEvent> for EventDto {
    fn from(event: &ChainEvent) -> Self {
        Self {
            event_type: event.event.kind().to_string(),
            present_id: event.event.present_id().to_string(),
            actor: event.event.actor().to_string(),
            block_number: event.position.block_number,
            log_index: event.position.log_index,
            transaction_hash: event.transaction_hash.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRangeDto {
    pub from_block: u64,
    pub to_block: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStatsDto {
    pub pages: usize,
    pub failed_pages: Vec<BlockRangeDto>,
    pub workers: usize,
    pub inter_batch_delay_ms: u64,
}

impl From<&FetchStats> for FetchStatsDto {
    fn from(stats: &FetchStats) -> Self {
        Self {
            pages: stats.pages,
            failed_pages: stats
                .failed_pages
                .iter()
                .map(|p| BlockRangeDto {
                    from_block: p.from_block,
                    to_block: p.to_block,
                })
                .collect(),
            workers: stats.workers,
            inter_batch_delay_ms: stats.inter_batch_delay_ms,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchByTimeResponse {
    pub from_timestamp: u64,
    pub to_timestamp: u64,
    pub from_block: u64,
    pub to_block: u64,
    /// Block bounds were estimated after a failed timestamp lookup
    pub approximate: bool,
    pub cached: bool,
    pub total_events: usize,
    pub event_counts: EventCountsDto,
    pub events: Vec<EventDto>,
    pub presents: Vec<PresentDto>,
    pub fetch: FetchStatsDto,
}

impl SearchByTimeResponse {
    pub fn from_result(result: &SearchResult, now: u64) -> Self {
        let (from_block, to_block) = result.range.scan_range();
        Self {
            from_timestamp: result.from_time,
            to_timestamp: result.to_time,
            from_block,
            to_block,
            approximate: result.range.approximate,
            cached: result.cached,
            total_events: result.counts.total(),
            event_counts: EventCountsDto::from(&result.counts),
            events: result.events.iter().map(EventDto::from).collect(),
            presents: result
                .presents
                .iter()
                .map(|p| PresentDto::from_present(p, now))
                .collect(),
            fetch: FetchStatsDto::from(&result.fetch),
        }
    }
}

// ============================================
// HEALTH DTOs
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub indexer: IndexPhase,
    pub last_processed_block: u64,
    pub uptime_seconds: u64,
    pub version: String,
    pub search_cache: CacheStatsDto,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsDto {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl From<CacheStats> for CacheStatsDto {
    fn from(stats: CacheStats) -> Self {
        Self {
            entries: stats.entries,
            hits: stats.hits,
            misses: stats.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::store::{PresentId, Provenance, ZERO_ADDRESS};
    use primitive_types::U256;

    #[test]
    fn test_present_dto_serialisation() {
        let mut present = Present::from_event(PresentId::new("0xabc"), "0x11", 1_700_000_000);
        present.assets = vec![Asset::new(ZERO_ADDRESS, U256::from_dec_str("123456789012345678901234567890").unwrap())];
        present.expiry_time = Some(1_000);
        present.provenance = Some(Provenance {
            event: EventKind::Wrapped,
            block_number: 7,
            transaction_hash: None,
        });

        let json = serde_json::to_value(PresentDto::from_present(&present, 2_000)).unwrap();
        assert_eq!(json["id"], "0xabc");
        assert_eq!(json["status"], 2);
        assert_eq!(json["isExpired"], true);
        assert_eq!(json["isPublic"], true);
        assert_eq!(json["assets"][0]["amount"], "123456789012345678901234567890");
        assert_eq!(json["assets"][0]["tokenType"], 0);
        assert_eq!(json["eventType"], "wrap");
        assert_eq!(json["blockNumber"], 7);
        assert!(json.get("transactionHash").is_none());
    }

    #[test]
    fn test_status_phase_serialises_lowercase() {
        let status = StoreStatus {
            is_indexing: true,
            last_processed_block: 9,
            total_entities: 2,
            total_events_applied: 3,
        };
        let json = serde_json::to_value(IndexerStatusResponse::new(status, IndexPhase::Backfilling)).unwrap();
        assert_eq!(json["phase"], "backfilling");
        assert_eq!(json["isIndexing"], true);
        assert_eq!(json["lastProcessedBlock"], 9);
    }
}
