use std::{path::PathBuf, time::Duration};

use alloy::primitives::{Address, BlockNumber};

use crate::{
    IndexerError,
    classifier::EventClassifier,
    log_source::ChainLogSource,
    scanner::{
        DEFAULT_BATCH_SIZE, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_FLUSH_INTERVAL,
        DEFAULT_FLUSH_THRESHOLD, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_BACKOFF,
        DEFAULT_STORAGE_RETRIES, DEFAULT_STORAGE_RETRY_DELAY, Scanner, ScannerConfig,
    },
    store::{CheckpointStore, EventBatchWriter},
};

/// Builder for a [`Scanner`].
///
/// ```rust,no_run
/// use alloy::{network::Ethereum, primitives::address};
/// use event_indexer::{RpcLogSourceBuilder, ScannerBuilder};
/// use std::time::Duration;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let source = RpcLogSourceBuilder::<Ethereum, _>::new("https://evmrpc.0g.ai").build().await?;
/// let scanner = ScannerBuilder::new(
///     address!("0xD9aB5190eFA86eB955C5e146ccb30421faBc3405"),
///     "./indexer_output",
/// )
/// .start_block(7_039_846)
/// .poll_interval(Duration::from_secs(15))
/// .build(source)?;
///
/// let summary = scanner.start().stop().await?;
/// println!("indexed up to block {}", summary.next_block);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ScannerBuilder {
    contract_address: Address,
    output_dir: PathBuf,
    start_block: BlockNumber,
    batch_size: u64,
    flush_threshold: usize,
    checkpoint_interval: u64,
    poll_interval: Duration,
    retry_backoff: Duration,
    flush_interval: Duration,
    storage_retries: usize,
    storage_retry_delay: Duration,
    classifier: Option<EventClassifier>,
}

impl ScannerBuilder {
    /// Creates a builder indexing `contract_address` into `output_dir`, starting at block 0.
    #[must_use]
    pub fn new(contract_address: Address, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            contract_address,
            output_dir: output_dir.into(),
            start_block: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            storage_retries: DEFAULT_STORAGE_RETRIES,
            storage_retry_delay: DEFAULT_STORAGE_RETRY_DELAY,
            classifier: None,
        }
    }

    /// Block to start from when no checkpoint exists.
    #[must_use]
    pub fn start_block(mut self, start_block: BlockNumber) -> Self {
        self.start_block = start_block;
        self
    }

    /// Maximum number of blocks per `get_logs` window.
    ///
    /// Must be greater than 0.
    #[must_use]
    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Buffered event count that triggers a flush to a new artifact.
    ///
    /// Must be greater than 0.
    #[must_use]
    pub fn flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    /// Number of completed windows between checkpoint saves.
    ///
    /// Must be greater than 0.
    #[must_use]
    pub fn checkpoint_interval(mut self, checkpoint_interval: u64) -> Self {
        self.checkpoint_interval = checkpoint_interval;
        self
    }

    /// Delay between chain head queries once caught up.
    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Delay before retrying a window whose chain calls failed.
    #[must_use]
    pub fn retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// How often buffered events are flushed and the checkpoint saved while live polling.
    #[must_use]
    pub fn flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// How many times a failed artifact or checkpoint write is retried before the scanner
    /// gives up.
    #[must_use]
    pub fn storage_retries(mut self, storage_retries: usize) -> Self {
        self.storage_retries = storage_retries;
        self
    }

    #[must_use]
    pub fn storage_retry_delay(mut self, storage_retry_delay: Duration) -> Self {
        self.storage_retry_delay = storage_retry_delay;
        self
    }

    /// Replaces the default NeuroLend signature table.
    #[must_use]
    pub fn classifier(mut self, classifier: EventClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Validates the configuration and opens the output directory.
    ///
    /// # Errors
    ///
    /// * [`IndexerError::InvalidBatchSize`], [`IndexerError::InvalidFlushThreshold`] or
    ///   [`IndexerError::InvalidCheckpointInterval`] for zero values.
    /// * [`IndexerError::Io`] if the output directory cannot be created or listed.
    pub fn build<S: ChainLogSource>(self, source: S) -> Result<Scanner<S>, IndexerError> {
        if self.batch_size == 0 {
            return Err(IndexerError::InvalidBatchSize);
        }
        if self.flush_threshold == 0 {
            return Err(IndexerError::InvalidFlushThreshold);
        }
        if self.checkpoint_interval == 0 {
            return Err(IndexerError::InvalidCheckpointInterval);
        }
        if self.poll_interval.is_zero() || self.flush_interval.is_zero() {
            return Err(IndexerError::Config("poll and flush intervals must be non-zero".into()));
        }

        let writer = EventBatchWriter::open(&self.output_dir)?;
        let checkpoints = CheckpointStore::new(&self.output_dir, self.start_block);
        let config = ScannerConfig {
            contract_address: self.contract_address,
            batch_size: self.batch_size,
            flush_threshold: self.flush_threshold,
            checkpoint_interval: self.checkpoint_interval,
            poll_interval: self.poll_interval,
            retry_backoff: self.retry_backoff,
            flush_interval: self.flush_interval,
            storage_retries: self.storage_retries,
            storage_retry_delay: self.storage_retry_delay,
        };

        Ok(Scanner::new(
            source,
            self.classifier.unwrap_or_default(),
            checkpoints,
            writer,
            config,
            self.start_block,
        ))
    }
}
