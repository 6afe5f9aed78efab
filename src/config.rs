//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::chain::RpcConfig;
use crate::fetcher::FetchConfig;
use crate::indexer::IndexerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub indexer: IndexerSection,

    #[serde(default)]
    pub fetcher: FetcherSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chain provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_contract_address")]
    pub contract_address: String,

    /// Informational; only one chain is indexed
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Average block time, used when a timestamp lookup fails
    #[serde(default = "default_block_time")]
    pub block_time_secs: u64,
}

fn default_rpc_url() -> String {
    "https://sepolia-rollup.arbitrum.io/rpc".to_string()
}

fn default_contract_address() -> String {
    "0x3B3cF7ee8dbCDDd8B8451e38269D982F351ca3db".to_string()
}

fn default_chain_id() -> u64 {
    421614 // Arbitrum Sepolia
}

fn default_request_timeout() -> u64 {
    30
}

fn default_block_time() -> u64 {
    2
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            contract_address: default_contract_address(),
            chain_id: default_chain_id(),
            request_timeout_secs: default_request_timeout(),
            block_time_secs: default_block_time(),
        }
    }
}

impl ChainConfig {
    pub fn rpc_config(&self) -> RpcConfig {
        let mut rpc = RpcConfig::new(&self.rpc_url, self.contract_address.to_ascii_lowercase());
        rpc.request_timeout = Duration::from_secs(self.request_timeout_secs);
        rpc
    }
}

/// Index controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerSection {
    /// Contract deployment block
    #[serde(default = "default_start_block")]
    pub start_block: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_enrichment_batch")]
    pub enrichment_batch: usize,
}

fn default_start_block() -> u64 {
    182_490_804
}

fn default_poll_interval() -> u64 {
    300 // 5 minutes
}

fn default_enrichment_batch() -> usize {
    25
}

impl Default for IndexerSection {
    fn default() -> Self {
        Self {
            start_block: default_start_block(),
            poll_interval_secs: default_poll_interval(),
            enrichment_batch: default_enrichment_batch(),
        }
    }
}

/// Paginated log fetch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherSection {
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    #[serde(default = "default_workers")]
    pub max_concurrent_workers: usize,

    #[serde(default = "default_inter_batch_delay")]
    pub inter_batch_delay_ms: u64,

    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_page_size() -> u64 {
    500
}

fn default_workers() -> usize {
    5
}

fn default_inter_batch_delay() -> u64 {
    300
}

fn default_rate_limit_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1000
}

impl Default for FetcherSection {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_concurrent_workers: default_workers(),
            inter_batch_delay_ms: default_inter_batch_delay(),
            rate_limit_retries: default_rate_limit_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl FetcherSection {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            page_size: self.page_size,
            max_concurrent_workers: self.max_concurrent_workers,
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
            rate_limit_retries: self.rate_limit_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Search result cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_entries() -> usize {
    64
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

impl CacheSection {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.ttl_secs),
            max_entries: self.max_entries,
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_max_page_size() -> usize {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_page_size: default_max_page_size(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("fargift-indexer").join("config.toml")),
            Some(PathBuf::from("/etc/fargift-indexer/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(value: Option<String>, target: &mut T) {
            if let Some(v) = value.and_then(|v| v.parse().ok()) {
                *target = v;
            }
        }

        // Chain overrides
        if let Some(url) = var("FARGIFT_RPC_URL") {
            self.chain.rpc_url = url;
        }
        if let Some(address) = var("FARGIFT_CONTRACT_ADDRESS") {
            self.chain.contract_address = address;
        }
        parsed(var("FARGIFT_BLOCK_TIME_SECS"), &mut self.chain.block_time_secs);

        // Indexer overrides
        parsed(var("FARGIFT_START_BLOCK"), &mut self.indexer.start_block);
        parsed(var("FARGIFT_POLL_INTERVAL_SECS"), &mut self.indexer.poll_interval_secs);

        // Fetcher overrides
        parsed(var("FARGIFT_PAGE_SIZE"), &mut self.fetcher.page_size);
        parsed(var("FARGIFT_MAX_WORKERS"), &mut self.fetcher.max_concurrent_workers);

        // API overrides
        if let Some(host) = var("FARGIFT_API_HOST") {
            self.api.host = host;
        }
        parsed(var("FARGIFT_API_PORT"), &mut self.api.port);

        // Logging overrides
        if let Some(level) = var("FARGIFT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("FARGIFT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            contract_address: self.chain.contract_address.to_ascii_lowercase(),
            start_block: self.indexer.start_block,
            poll_interval: Duration::from_secs(self.indexer.poll_interval_secs.max(1)),
            enrichment_batch: self.indexer.enrichment_batch,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Fargift Indexer Configuration
#
# Environment variables override these settings:
# - FARGIFT_RPC_URL
# - FARGIFT_CONTRACT_ADDRESS
# - FARGIFT_BLOCK_TIME_SECS
# - FARGIFT_START_BLOCK
# - FARGIFT_POLL_INTERVAL_SECS
# - FARGIFT_PAGE_SIZE
# - FARGIFT_MAX_WORKERS
# - FARGIFT_API_HOST
# - FARGIFT_API_PORT
# - FARGIFT_LOG_LEVEL
# - FARGIFT_LOG_FORMAT

[chain]
# JSON-RPC endpoint (e.g. an Alchemy or Infura HTTPS URL)
rpc_url = "https://sepolia-rollup.arbitrum.io/rpc"

# Present contract address
contract_address = "0x3B3cF7ee8dbCDDd8B8451e38269D982F351ca3db"

# Chain id (Arbitrum Sepolia)
chain_id = 421614

# Per-request timeout in seconds
request_timeout_secs = 30

# Average block time, used to estimate blocks when a timestamp lookup fails
block_time_secs = 2

[indexer]
# Contract deployment block; backfill starts here
start_block = 182490804

# How often to poll for new blocks (seconds)
poll_interval_secs = 300

# Presents whose detail read is retried per poll
enrichment_batch = 25

[fetcher]
# Blocks per eth_getLogs call
page_size = 500

# Pages fetched in parallel
max_concurrent_workers = 5

# Pause between groups of pages (ms)
inter_batch_delay_ms = 300

# Retries for a rate-limited page
rate_limit_retries = 2

# Pause before retrying a rate-limited page (ms)
retry_delay_ms = 1000

[cache]
# Lifetime of a cached search result (seconds)
ttl_secs = 300

# Maximum cached block ranges
max_entries = 64

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 3001

# Allowed CORS origins
cors_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]

# Largest page size accepted by list endpoints
max_page_size = 100

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
