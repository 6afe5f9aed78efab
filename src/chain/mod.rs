//! Chain Access
//!
//! Capabilities the indexer consumes from a blockchain data provider:
//!
//! - [`LogSource`]: head block, block timestamps and raw contract logs
//! - [`PresentReader`]: snapshot reads of full present details for enrichment
//!
//! [`RpcClient`] implements both over Ethereum JSON-RPC. Any other provider
//! (indexing API, archive node) only has to satisfy the traits.

pub mod abi;
pub mod error;
pub mod quantity;
pub mod rpc;

pub use error::{SourceError, SourceResult};
pub use rpc::{RpcClient, RpcConfig};

use async_trait::async_trait;

use crate::store::{PresentDetails, PresentId};

/// One contract log as returned by the provider
///
/// Uninterpreted: topics and data stay hex strings until the classifier
/// decodes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: u64,
    pub block_hash: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: u64,
}

/// Source of chain heads, block timestamps and contract logs
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Current chain head block number
    async fn current_block(&self) -> SourceResult<u64>;

    /// Timestamp (unix seconds) of a block
    async fn block_timestamp(&self, block: u64) -> SourceResult<u64>;

    /// Logs emitted by `address` over the inclusive range `[from_block, to_block]`
    ///
    /// `topics` restricts topic0; `None` returns every event of the contract.
    async fn get_logs(
        &self,
        address: &str,
        from_block: u64,
        to_block: u64,
        topics: Option<&[String]>,
    ) -> SourceResult<Vec<RawLog>>;
}

/// Snapshot reader for full present details
#[async_trait]
pub trait PresentReader: Send + Sync {
    /// Read the on-chain details of a present; `None` when the contract does
    /// not know the id
    async fn present_details(&self, id: &PresentId) -> SourceResult<Option<PresentDetails>>;
}
