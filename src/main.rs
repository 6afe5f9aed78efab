//! Fargift Indexer Server
//!
//! Run with: cargo run --bin fargift-indexer -- --config config.toml
//!
//! # Configuration
//!
//! Loaded from `--config`, or the default locations, then overridden by
//! environment variables:
//! - `FARGIFT_RPC_URL`: JSON-RPC endpoint
//! - `FARGIFT_CONTRACT_ADDRESS`: Present contract address
//! - `FARGIFT_START_BLOCK`: Contract deployment block
//! - `FARGIFT_POLL_INTERVAL_SECS`: Seconds between incremental polls
//! - `FARGIFT_API_HOST` / `FARGIFT_API_PORT`: Bind address (default: 0.0.0.0:3001)
//! - `FARGIFT_LOG_LEVEL` / `FARGIFT_LOG_FORMAT`: Logging (pretty or json)
//! - `RUST_LOG`: Overrides the log filter entirely

use anyhow::Context;
use clap::Parser;
use fargift_indexer::api::{serve, AppState};
use fargift_indexer::config::{Config, LoggingConfig};
use fargift_indexer::indexer::{IndexController, TimeRangeSearch};
use fargift_indexer::store::EntityStore;
use fargift_indexer::RpcClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fargift-indexer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Index Fargift presents from contract logs and serve them over HTTP")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args, bootstrap_subscriber())?;

    init_tracing(&config.logging);

    tracing::info!("Starting Fargift indexer v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        rpc_url = %config.chain.rpc_url,
        contract = %config.chain.contract_address,
        chain_id = config.chain.chain_id,
        "Chain configuration"
    );

    let provider = Arc::new(
        RpcClient::new(config.chain.rpc_config()).context("building JSON-RPC client")?,
    );

    let store = Arc::new(EntityStore::new());
    let controller = Arc::new(IndexController::new(
        provider.clone(),
        provider.clone(),
        Arc::clone(&store),
        config.fetcher.fetch_config(),
        config.indexer_config(),
    ));

    let search = Arc::new(TimeRangeSearch::new(
        provider.clone(),
        provider,
        config.chain.contract_address.to_ascii_lowercase(),
        config.chain.block_time_secs,
        config.fetcher.fetch_config(),
        config.cache.cache_config(),
    ));

    // Backfill and polling run in the background; the API serves partial state meanwhile
    let indexer_handle = Arc::clone(&controller).start()?;

    let state = AppState::new(Arc::clone(&controller), search, config.api.clone());
    tracing::info!("Starting server on {}", config.api.addr());
    serve(state, &config.api).await?;

    // Graceful shutdown
    tracing::info!("Stopping indexer...");
    controller.stop();
    if let Err(e) = indexer_handle.await {
        tracing::error!(error = %e, "Indexer task ended abnormally");
    }

    let status = store.status().await;
    tracing::info!(
        last_processed_block = status.last_processed_block,
        total_entities = status.total_entities,
        "Fargift indexer stopped"
    );
    Ok(())
}

/// Load the config with `bootstrap` as the active subscriber, so lines
/// logged before the configured subscriber exists are not lost
fn load_config<S>(args: &Args, bootstrap: S) -> anyhow::Result<Config>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::with_default(bootstrap, || match &args.config {
        Some(path) => {
            let config = Config::load_with_env(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            tracing::info!("Loaded config from {:?}", path);
            Ok(config)
        }
        None => Ok(Config::load_default()),
    })
}

fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fargift_indexer=info".into()),
        )
        .with_writer(std::io::stderr)
        .finish()
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("fargift_indexer={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capturing_subscriber(captured: &Captured) -> impl tracing::Subscriber + Send + Sync + 'static {
        let writer = captured.clone();
        tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish()
    }

    #[test]
    fn test_config_load_is_logged_before_tracing_init() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nport = 4010").unwrap();
        let args = Args {
            config: Some(file.path().to_path_buf()),
        };

        let captured = Captured::default();
        let config = load_config(&args, capturing_subscriber(&captured)).unwrap();

        assert_eq!(config.api.port, 4010);
        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Loaded config from"));
    }

    #[test]
    fn test_bad_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api\nport = ").unwrap();
        let args = Args {
            config: Some(file.path().to_path_buf()),
        };

        let captured = Captured::default();
        assert!(load_config(&args, capturing_subscriber(&captured)).is_err());
    }
}
