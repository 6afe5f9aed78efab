//! Ethereum JSON-RPC Client
//!
//! HTTP client for a single JSON-RPC endpoint. Implements [`LogSource`] via
//! `eth_blockNumber`, `eth_getBlockByNumber` and `eth_getLogs`, and
//! [`PresentReader`] via `eth_call` on `getPresent(bytes32)`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::abi::{decode_present_details, encode_get_present};
use super::quantity::{parse_hex_quantity, to_hex_quantity};
use super::{LogSource, PresentReader, RawLog, SourceError, SourceResult};
use crate::store::{PresentDetails, PresentId};

/// Configuration for the RPC client
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Endpoint URL (e.g. an Alchemy or Infura HTTPS URL)
    pub url: String,
    /// Present contract address used for snapshot reads
    pub contract_address: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>, contract_address: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            contract_address: contract_address.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// JSON-RPC over HTTP
pub struct RpcClient {
    client: Client,
    config: RpcConfig,
    next_id: AtomicU64,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcBlock {
    timestamp: String,
}

/// Log as serialised by `eth_getLogs`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    #[serde(default)]
    data: String,
    block_number: Option<String>,
    block_hash: Option<String>,
    transaction_hash: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

impl RpcLog {
    /// Convert to a [`RawLog`]; pending logs (no block number yet) yield `None`
    fn into_raw(self) -> SourceResult<Option<RawLog>> {
        let (Some(block_number), Some(log_index)) = (self.block_number, self.log_index) else {
            return Ok(None);
        };
        Ok(Some(RawLog {
            address: self.address.to_ascii_lowercase(),
            topics: self.topics.into_iter().map(|t| t.to_ascii_lowercase()).collect(),
            data: self.data,
            block_number: parse_hex_quantity(&block_number)?,
            block_hash: self.block_hash,
            transaction_hash: self.transaction_hash,
            log_index: parse_hex_quantity(&log_index)?,
        }))
    }
}

/// Map a JSON-RPC error object onto the source error taxonomy
///
/// Providers reuse `-32005` for result-size limits; those are not retried.
fn classify_rpc_error(code: i64, message: &str) -> SourceError {
    let lower = message.to_ascii_lowercase();
    let result_too_large = RESULT_SIZE_MARKERS.iter().any(|m| lower.contains(m));
    let rate_limited = code == 429
        || code == -32005
        || RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m));

    if rate_limited && !result_too_large {
        SourceError::RateLimited
    } else {
        SourceError::Rpc {
            code,
            message: message.to_string(),
        }
    }
}

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "too many requests",
    "compute units per second",
    "request limit",
];

const RESULT_SIZE_MARKERS: &[&str] = &[
    "more than",
    "response size",
    "block range",
    "range is too large",
    "too many results",
];

fn is_revert(err: &SourceError) -> bool {
    match err {
        SourceError::Rpc { code, message } => {
            *code == 3 || message.to_ascii_lowercase().contains("execution reverted")
        }
        _ => false,
    }
}

impl RpcClient {
    /// Create a new RPC client with the given configuration
    pub fn new(config: RpcConfig) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Send one JSON-RPC request and decode its result
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> SourceResult<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SourceError::Unavailable(format!("HTTP {}: {}", status, text)));
        }

        let body: JsonRpcResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(classify_rpc_error(err.code, &err.message));
        }
        let result = body.result.unwrap_or(Value::Null);
        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl LogSource for RpcClient {
    async fn current_block(&self) -> SourceResult<u64> {
        let raw: String = self.call("eth_blockNumber", json!([])).await?;
        parse_hex_quantity(&raw)
    }

    async fn block_timestamp(&self, block: u64) -> SourceResult<u64> {
        let result: Option<RpcBlock> = self
            .call("eth_getBlockByNumber", json!([to_hex_quantity(block), false]))
            .await?;
        let block_info = result
            .ok_or_else(|| SourceError::Unavailable(format!("block {} not found", block)))?;
        parse_hex_quantity(&block_info.timestamp)
    }

    async fn get_logs(
        &self,
        address: &str,
        from_block: u64,
        to_block: u64,
        topics: Option<&[String]>,
    ) -> SourceResult<Vec<RawLog>> {
        let filter = json!({
            "address": address,
            "fromBlock": to_hex_quantity(from_block),
            "toBlock": to_hex_quantity(to_block),
            "topics": topics.map(|t| vec![t.to_vec()]).unwrap_or_default(),
        });
        let logs: Vec<RpcLog> = self.call("eth_getLogs", json!([filter])).await?;

        let mut raw = Vec::with_capacity(logs.len());
        for log in logs {
            if log.removed {
                continue;
            }
            if let Some(log) = log.into_raw()? {
                raw.push(log);
            }
        }
        Ok(raw)
    }
}

#[async_trait]
impl PresentReader for RpcClient {
    async fn present_details(&self, id: &PresentId) -> SourceResult<Option<PresentDetails>> {
        let data = encode_get_present(id).map_err(|e| SourceError::Decode(e.to_string()))?;
        let call = json!({ "to": self.config.contract_address, "data": data });

        let result: SourceResult<String> = self.call("eth_call", json!([call, "latest"])).await;
        match result {
            Ok(raw) => decode_present_details(&raw).map_err(|e| SourceError::Decode(e.to_string())),
            Err(e) if is_revert(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_log_conversion() {
        let log: RpcLog = serde_json::from_value(json!({
            "address": "0x3B3cF7ee8dbCDDd8B8451e38269D982F351ca3db",
            "topics": ["0xAA", "0xBB"],
            "data": "0x",
            "blockNumber": "0xae096b4",
            "blockHash": "0x01",
            "transactionHash": "0x02",
            "logIndex": "0x1f",
            "removed": false
        }))
        .unwrap();

        let raw = log.into_raw().unwrap().unwrap();
        assert_eq!(raw.address, "0x3b3cf7ee8dbcddd8b8451e38269d982f351ca3db");
        assert_eq!(raw.topics, vec!["0xaa", "0xbb"]);
        assert_eq!(raw.block_number, 182_490_804);
        assert_eq!(raw.log_index, 31);
        assert_eq!(raw.transaction_hash.as_deref(), Some("0x02"));
    }

    #[test]
    fn test_pending_log_is_skipped() {
        let log: RpcLog = serde_json::from_value(json!({
            "address": "0x01",
            "topics": [],
            "blockNumber": null,
            "logIndex": null
        }))
        .unwrap();
        assert_eq!(log.into_raw().unwrap(), None);
    }

    #[test]
    fn test_classify_rpc_error() {
        assert_eq!(classify_rpc_error(-32005, "limit exceeded"), SourceError::RateLimited);
        assert_eq!(
            classify_rpc_error(-32000, "Your app has exceeded its compute units per second capacity"),
            SourceError::RateLimited
        );
        assert!(matches!(
            classify_rpc_error(-32602, "invalid params"),
            SourceError::Rpc { code: -32602, .. }
        ));
    }

    #[test]
    fn test_result_size_limits_are_not_rate_limits() {
        assert!(matches!(
            classify_rpc_error(-32005, "query returned more than 10000 results"),
            SourceError::Rpc { code: -32005, .. }
        ));
        assert!(matches!(
            classify_rpc_error(-32602, "Log response size exceeded. You can make eth_getLogs requests with up to a 2K block range"),
            SourceError::Rpc { .. }
        ));
        assert!(matches!(
            classify_rpc_error(-32000, "gas limit exceeded"),
            SourceError::Rpc { .. }
        ));
        assert_eq!(
            classify_rpc_error(-32005, "daily request limit exceeded"),
            SourceError::RateLimited
        );
    }

    #[test]
    fn test_revert_detection() {
        assert!(is_revert(&SourceError::Rpc {
            code: -32000,
            message: "execution reverted".into()
        }));
        assert!(!is_revert(&SourceError::RateLimited));
    }

    #[test]
    fn test_client_construction() {
        let client = RpcClient::new(RpcConfig::new("http://localhost:8545", "0x01")).unwrap();
        assert_eq!(client.config().url, "http://localhost:8545");
        assert_eq!(client.config().request_timeout, Duration::from_secs(30));
    }
}
