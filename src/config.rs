//! Environment-driven configuration for the `event-indexer` binary.

use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use alloy::{
    network::Ethereum,
    primitives::{Address, BlockNumber, address},
};

use crate::{
    IndexerError,
    log_source::{DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_RETRIES, RpcLogSource, RpcLogSourceBuilder},
    scanner::{
        DEFAULT_BATCH_SIZE, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_FLUSH_INTERVAL,
        DEFAULT_FLUSH_THRESHOLD, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_BACKOFF, ScannerBuilder,
    },
};

pub const DEFAULT_RPC_URL: &str = "https://evmrpc.0g.ai";
pub const DEFAULT_CONTRACT_ADDRESS: Address = address!("0xD9aB5190eFA86eB955C5e146ccb30421faBc3405");
pub const DEFAULT_STARTING_BLOCK: BlockNumber = 7_039_846;
pub const DEFAULT_OUTPUT_DIR: &str = "./indexer_output";

/// Indexer settings. Every field has a default and can be overridden by an environment
/// variable of the same name in upper case (see [`IndexerConfig::from_env`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    pub rpc_url: String,
    pub fallback_rpc_urls: Vec<String>,
    pub contract_address: Address,
    pub starting_block: BlockNumber,
    pub batch_size: u64,
    pub output_dir: PathBuf,
    pub flush_threshold: usize,
    pub checkpoint_interval: u64,
    pub poll_interval: Duration,
    pub retry_backoff: Duration,
    pub flush_interval: Duration,
    pub rpc_call_timeout: Duration,
    pub rpc_max_retries: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_owned(),
            fallback_rpc_urls: Vec::new(),
            contract_address: DEFAULT_CONTRACT_ADDRESS,
            starting_block: DEFAULT_STARTING_BLOCK,
            batch_size: DEFAULT_BATCH_SIZE,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            rpc_call_timeout: DEFAULT_CALL_TIMEOUT,
            rpc_max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl IndexerConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// | Variable                 | Field                |
    /// |--------------------------|----------------------|
    /// | `RPC_URL`                | `rpc_url`            |
    /// | `FALLBACK_RPC_URLS`      | `fallback_rpc_urls` (comma separated) |
    /// | `CONTRACT_ADDRESS`       | `contract_address`   |
    /// | `STARTING_BLOCK`         | `starting_block`     |
    /// | `BATCH_SIZE`             | `batch_size`         |
    /// | `OUTPUT_DIR`             | `output_dir`         |
    /// | `FLUSH_THRESHOLD`        | `flush_threshold`    |
    /// | `CHECKPOINT_INTERVAL`    | `checkpoint_interval` (windows) |
    /// | `POLL_INTERVAL_SECS`     | `poll_interval`      |
    /// | `RETRY_BACKOFF_SECS`     | `retry_backoff`      |
    /// | `FLUSH_INTERVAL_SECS`    | `flush_interval`     |
    /// | `RPC_CALL_TIMEOUT_SECS`  | `rpc_call_timeout`   |
    /// | `RPC_MAX_RETRIES`        | `rpc_max_retries`    |
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Config`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, IndexerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Config`] if a variable is set but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IndexerError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|value| value.trim().to_owned()).filter(|v| !v.is_empty());

        Ok(Self {
            rpc_url: var("RPC_URL").unwrap_or(defaults.rpc_url),
            fallback_rpc_urls: var("FALLBACK_RPC_URLS")
                .map(|urls| {
                    urls.split(',')
                        .map(str::trim)
                        .filter(|url| !url.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            contract_address: parse(var("CONTRACT_ADDRESS"), "CONTRACT_ADDRESS")?
                .unwrap_or(defaults.contract_address),
            starting_block: parse(var("STARTING_BLOCK"), "STARTING_BLOCK")?
                .unwrap_or(defaults.starting_block),
            batch_size: parse(var("BATCH_SIZE"), "BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            output_dir: var("OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            flush_threshold: parse(var("FLUSH_THRESHOLD"), "FLUSH_THRESHOLD")?
                .unwrap_or(defaults.flush_threshold),
            checkpoint_interval: parse(var("CHECKPOINT_INTERVAL"), "CHECKPOINT_INTERVAL")?
                .unwrap_or(defaults.checkpoint_interval),
            poll_interval: parse_secs(var("POLL_INTERVAL_SECS"), "POLL_INTERVAL_SECS")?
                .unwrap_or(defaults.poll_interval),
            retry_backoff: parse_secs(var("RETRY_BACKOFF_SECS"), "RETRY_BACKOFF_SECS")?
                .unwrap_or(defaults.retry_backoff),
            flush_interval: parse_secs(var("FLUSH_INTERVAL_SECS"), "FLUSH_INTERVAL_SECS")?
                .unwrap_or(defaults.flush_interval),
            rpc_call_timeout: parse_secs(var("RPC_CALL_TIMEOUT_SECS"), "RPC_CALL_TIMEOUT_SECS")?
                .unwrap_or(defaults.rpc_call_timeout),
            rpc_max_retries: parse(var("RPC_MAX_RETRIES"), "RPC_MAX_RETRIES")?
                .unwrap_or(defaults.rpc_max_retries),
        })
    }

    /// A [`ScannerBuilder`] carrying the scanner settings of this configuration.
    #[must_use]
    pub fn scanner_builder(&self) -> ScannerBuilder {
        ScannerBuilder::new(self.contract_address, &self.output_dir)
            .start_block(self.starting_block)
            .batch_size(self.batch_size)
            .flush_threshold(self.flush_threshold)
            .checkpoint_interval(self.checkpoint_interval)
            .poll_interval(self.poll_interval)
            .retry_backoff(self.retry_backoff)
            .flush_interval(self.flush_interval)
    }

    /// Connects the primary and fallback RPC endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Source`] if an endpoint cannot be connected.
    pub async fn connect_source(&self) -> Result<RpcLogSource<Ethereum>, IndexerError> {
        let mut builder = RpcLogSourceBuilder::<Ethereum, _>::new(self.rpc_url.clone())
            .call_timeout(self.rpc_call_timeout)
            .max_retries(self.rpc_max_retries);
        for url in &self.fallback_rpc_urls {
            builder = builder.fallback(url.clone());
        }
        Ok(builder.build().await?)
    }
}

fn parse<T>(value: Option<String>, key: &str) -> Result<Option<T>, IndexerError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .map(|raw| {
            raw.parse::<T>().map_err(|e| IndexerError::Config(format!("invalid {key} {raw:?}: {e}")))
        })
        .transpose()
}

fn parse_secs(value: Option<String>, key: &str) -> Result<Option<Duration>, IndexerError> {
    Ok(parse::<u64>(value, key)?.map(Duration::from_secs))
}
