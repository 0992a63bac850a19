//! The indexing pipeline: a backfill-then-poll state machine over a [`ChainLogSource`].
//!
//! A [`Scanner`] owns all mutable indexing state. It is driven by a single task, so a flush
//! never races an append and two windows never run concurrently.
//!
//! # Lifecycle
//!
//! ```text
//! Initializing ──► Backfilling ──► LivePolling ──► Stopped
//!                      │  ▲            │  ▲
//!                      ▼  │            ▼  │
//!                   ErrorBackoff    ErrorBackoff
//! ```
//!
//! * **Initializing** loads the checkpoint and queries the chain head.
//! * **Backfilling** processes windows of `batch_size` blocks up to the head seen at startup.
//! * **LivePolling** re-queries the head every `poll_interval` and scans any new blocks with the
//!   same window logic. A `flush_interval` timer flushes low-traffic buffers.
//! * **ErrorBackoff** is entered when a chain call fails mid-window. The scanner waits
//!   `retry_backoff` and retries the same window, indefinitely.
//! * **Stopped** is reached once the shutdown token is cancelled: the buffer is flushed and the
//!   final checkpoint persisted.
//!
//! # Durability
//!
//! The checkpoint is only saved right after the buffer has been flushed, so a persisted
//! `next_block` never covers events that exist only in memory. A restart may re-scan blocks
//! past the checkpoint and write duplicate events; those are removed on read by
//! [`load_event_set`](crate::load_event_set).

mod builder;
mod handle;
mod window;

use std::{collections::HashMap, ops::ControlFlow, ops::RangeInclusive, time::Duration};

use alloy::primitives::{Address, BlockNumber};
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior, interval_at, sleep},
};
use tokio_util::sync::CancellationToken;

use crate::{
    IndexerError,
    classifier::EventClassifier,
    log_source::{self, ChainLogSource},
    store::{Checkpoint, CheckpointStore, EventBatchWriter},
    types::ClassifiedEvent,
};

pub use builder::ScannerBuilder;
pub use handle::{Progress, ScanSummary, ScannerHandle, ScannerState};
use window::block_windows;

/// Default number of blocks per `get_logs` window.
pub const DEFAULT_BATCH_SIZE: u64 = 100;
/// Default buffered event count that triggers a flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 100;
/// Default number of windows between checkpoint saves.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_STORAGE_RETRIES: usize = 3;
pub const DEFAULT_STORAGE_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub(crate) struct ScannerConfig {
    pub(crate) contract_address: Address,
    pub(crate) batch_size: u64,
    pub(crate) flush_threshold: usize,
    pub(crate) checkpoint_interval: u64,
    pub(crate) poll_interval: Duration,
    pub(crate) retry_backoff: Duration,
    pub(crate) flush_interval: Duration,
    pub(crate) storage_retries: usize,
    pub(crate) storage_retry_delay: Duration,
}

#[derive(Debug, Default, Clone, Copy)]
struct ScanStats {
    windows_processed: u64,
    events_indexed: u64,
    artifacts_written: u64,
}

/// Resumable contract event indexer. Build one with [`ScannerBuilder`].
#[derive(Debug)]
pub struct Scanner<S> {
    source: S,
    classifier: EventClassifier,
    checkpoints: CheckpointStore,
    writer: EventBatchWriter,
    config: ScannerConfig,
    state: ScannerState,
    /// First block not yet processed.
    current: BlockNumber,
    latest: Option<BlockNumber>,
    windows_since_checkpoint: u64,
    stats: ScanStats,
    progress: watch::Sender<Progress>,
}

impl<S: ChainLogSource> Scanner<S> {
    pub(crate) fn new(
        source: S,
        classifier: EventClassifier,
        checkpoints: CheckpointStore,
        writer: EventBatchWriter,
        config: ScannerConfig,
        start_block: BlockNumber,
    ) -> Self {
        let (progress, _) = watch::channel(Progress::new(start_block));
        Self {
            source,
            classifier,
            checkpoints,
            writer,
            config,
            state: ScannerState::Initializing,
            current: start_block,
            latest: None,
            windows_since_checkpoint: 0,
            stats: ScanStats::default(),
            progress,
        }
    }

    /// Subscribes to progress updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Runs the scanner until `shutdown` is cancelled.
    ///
    /// Chain source failures are retried forever and never returned. On cancellation the buffer
    /// is flushed and the final checkpoint saved before returning.
    ///
    /// # Errors
    ///
    /// * [`IndexerError::StorageExhausted`] if an artifact or checkpoint write kept failing.
    /// * [`IndexerError::CheckpointRegression`] if the checkpoint would move backwards.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<ScanSummary, IndexerError> {
        if let Err(e) = self.drive(&shutdown).await {
            error!(error = %e, next_block = self.current, "Scanner failed");
            self.set_state(ScannerState::Stopped);
            return Err(e);
        }
        self.shut_down().await
    }

    /// Spawns [`run`](Self::run) on the current tokio runtime.
    #[must_use]
    pub fn start(self) -> ScannerHandle
    where
        S: 'static,
    {
        let shutdown = CancellationToken::new();
        let progress = self.subscribe();
        let task = tokio::spawn(self.run(shutdown.clone()));
        ScannerHandle::new(shutdown, progress, task)
    }

    async fn drive(&mut self, shutdown: &CancellationToken) -> Result<(), IndexerError> {
        let checkpoint = self.checkpoints.load();
        self.current = checkpoint.next_block;
        self.publish();

        let Some(latest) = self.fetch_latest(shutdown).await else {
            return Ok(());
        };
        self.latest = Some(latest);

        if self.current <= latest {
            info!(from_block = self.current, to_block = latest, "Starting backfill");
            self.set_state(ScannerState::Backfilling);
            if self.scan_to(latest, shutdown).await?.is_break() {
                return Ok(());
            }
            info!(next_block = self.current, "Backfill complete");
        }

        self.set_state(ScannerState::LivePolling);
        self.poll_live(shutdown).await
    }

    /// Queries the chain head, retrying with backoff until it succeeds or shutdown is requested.
    async fn fetch_latest(&mut self, shutdown: &CancellationToken) -> Option<BlockNumber> {
        loop {
            match self.source.latest_block_number().await {
                Ok(latest) => {
                    info!(latest_block = latest, next_block = self.current, "Chain head");
                    return Some(latest);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to query latest block");
                    if self.back_off(shutdown).await.is_break() {
                        return None;
                    }
                }
            }
        }
    }

    async fn poll_live(&mut self, shutdown: &CancellationToken) -> Result<(), IndexerError> {
        info!(next_block = self.current, "Live polling");

        let now = Instant::now();
        let mut poll = interval_at(now + self.config.poll_interval, self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush = interval_at(now + self.config.flush_interval, self.config.flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => return Ok(()),
                _ = poll.tick() => {
                    let latest = match self.source.latest_block_number().await {
                        Ok(latest) => latest,
                        Err(e) => {
                            warn!(error = %e, "Failed to query latest block, retrying next poll");
                            continue;
                        }
                    };
                    self.latest = Some(latest);
                    self.publish();

                    if latest >= self.current {
                        debug!(from_block = self.current, to_block = latest, "New blocks");
                        if self.scan_to(latest, shutdown).await?.is_break() {
                            return Ok(());
                        }
                    }
                }
                _ = flush.tick() => {
                    if !self.writer.is_empty() || self.checkpoint_lags() {
                        self.persist().await?;
                    }
                }
            }
        }
    }

    /// Processes every window from `current` to `target`.
    ///
    /// Breaks when shutdown is requested between windows or during a backoff wait. An
    /// abandoned window leaves no trace: its events are never appended and `current` is
    /// not advanced.
    async fn scan_to(
        &mut self,
        target: BlockNumber,
        shutdown: &CancellationToken,
    ) -> Result<ControlFlow<()>, IndexerError> {
        for window in block_windows(self.current, target, self.config.batch_size) {
            if shutdown.is_cancelled() {
                return Ok(ControlFlow::Break(()));
            }

            let events = loop {
                match self.scan_window(window.clone()).await {
                    Ok(events) => break events,
                    Err(e) => {
                        warn!(
                            from_block = window.start(),
                            to_block = window.end(),
                            error = %e,
                            "Failed to scan window"
                        );
                        if self.back_off(shutdown).await.is_break() {
                            return Ok(ControlFlow::Break(()));
                        }
                    }
                }
            };

            self.commit_window(&window, events).await?;
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Fetches, timestamps and classifies the logs of one window. Has no side effects, so a
    /// failed window can be retried from scratch.
    async fn scan_window(
        &self,
        window: RangeInclusive<BlockNumber>,
    ) -> Result<Vec<ClassifiedEvent>, log_source::Error> {
        let logs = self.source.get_logs(self.config.contract_address, window).await?;

        let mut timestamps: HashMap<BlockNumber, u64> = HashMap::new();
        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let block_timestamp = match log.block_timestamp {
                Some(timestamp) => timestamp,
                None => match timestamps.get(&log.block_number) {
                    Some(&timestamp) => timestamp,
                    None => {
                        let timestamp = self.source.block_timestamp(log.block_number).await?;
                        timestamps.insert(log.block_number, timestamp);
                        timestamp
                    }
                },
            };
            let event_name = self.classifier.classify(&log);
            trace!(event_name, block_number = log.block_number, log_index = log.log_index, "Classified log");
            events.push(ClassifiedEvent::new(log, event_name, block_timestamp));
        }
        Ok(events)
    }

    async fn commit_window(
        &mut self,
        window: &RangeInclusive<BlockNumber>,
        events: Vec<ClassifiedEvent>,
    ) -> Result<(), IndexerError> {
        let found = events.len();
        let accepted = self.writer.append(events);

        self.current = window.end().saturating_add(1);
        self.windows_since_checkpoint += 1;
        self.stats.windows_processed += 1;
        self.stats.events_indexed += accepted as u64;

        info!(from_block = window.start(), to_block = window.end(), found, "Processed window");

        if self.writer.len() >= self.config.flush_threshold {
            self.flush_buffer().await?;
        }
        if self.windows_since_checkpoint >= self.config.checkpoint_interval {
            self.persist().await?;
        }
        self.publish();
        Ok(())
    }

    /// Flushes the buffer, then saves a checkpoint at `current`.
    async fn persist(&mut self) -> Result<(), IndexerError> {
        self.flush_buffer().await?;

        let checkpoint = Checkpoint::new(self.current);
        self.retry_storage("checkpoint", |scanner| scanner.checkpoints.save(&checkpoint)).await?;
        self.windows_since_checkpoint = 0;
        debug!(next_block = checkpoint.next_block, "Progress persisted");
        self.publish();
        Ok(())
    }

    async fn flush_buffer(&mut self) -> Result<(), IndexerError> {
        if let Some(artifact) = self.retry_storage("batch artifact", |scanner| scanner.writer.flush()).await? {
            self.stats.artifacts_written += 1;
            debug!(artifact_id = artifact.id, event_count = artifact.event_count, "Buffer flushed");
        }
        Ok(())
    }

    /// Runs a storage write, retrying it `storage_retries` times with a fixed delay.
    async fn retry_storage<T>(
        &mut self,
        what: &'static str,
        mut write: impl FnMut(&mut Self) -> Result<T, IndexerError>,
    ) -> Result<T, IndexerError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match write(self) {
                Ok(value) => return Ok(value),
                Err(e @ IndexerError::CheckpointRegression { .. }) => return Err(e),
                Err(e) if attempts > self.config.storage_retries => {
                    error!(what, attempts, error = %e, "Storage write failed, giving up");
                    return Err(IndexerError::StorageExhausted { attempts, last_error: Box::new(e) });
                }
                Err(e) => {
                    warn!(what, attempts, error = %e, "Storage write failed, retrying");
                    sleep(self.config.storage_retry_delay).await;
                }
            }
        }
    }

    /// Waits `retry_backoff` in [`ScannerState::ErrorBackoff`], then restores the previous state.
    async fn back_off(&mut self, shutdown: &CancellationToken) -> ControlFlow<()> {
        let resume = self.state;
        self.set_state(ScannerState::ErrorBackoff);

        let flow = tokio::select! {
            biased;

            () = shutdown.cancelled() => ControlFlow::Break(()),
            () = sleep(self.config.retry_backoff) => ControlFlow::Continue(()),
        };

        self.set_state(resume);
        flow
    }

    async fn shut_down(mut self) -> Result<ScanSummary, IndexerError> {
        info!(next_block = self.current, buffered = self.writer.len(), "Stopping scanner");

        let result = self.persist().await;
        self.set_state(ScannerState::Stopped);
        result?;

        let summary = ScanSummary {
            next_block: self.current,
            windows_processed: self.stats.windows_processed,
            events_indexed: self.stats.events_indexed,
            artifacts_written: self.stats.artifacts_written,
        };
        info!(
            next_block = summary.next_block,
            windows = summary.windows_processed,
            events = summary.events_indexed,
            artifacts = summary.artifacts_written,
            "Scanner stopped"
        );
        Ok(summary)
    }

    fn checkpoint_lags(&self) -> bool {
        self.checkpoints.persisted().is_none_or(|persisted| persisted < self.current)
    }

    fn set_state(&mut self, state: ScannerState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "State transition");
            self.state = state;
        }
        self.publish();
    }

    fn publish(&self) {
        let progress = Progress {
            state: self.state,
            next_block: self.current,
            latest_block: self.latest,
            buffered_events: self.writer.len(),
            events_indexed: self.stats.events_indexed,
            artifacts_written: self.stats.artifacts_written,
            checkpointed_block: self.checkpoints.persisted(),
        };
        self.progress.send_if_modified(|current| {
            if *current == progress {
                false
            } else {
                *current = progress;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{load_event_set, store::CHECKPOINT_FILE_NAME, test_utils::MockLogSource};
    use alloy::primitives::B256;
    use tempfile::TempDir;

    fn scanner(dir: &TempDir, source: MockLogSource) -> Scanner<MockLogSource> {
        ScannerBuilder::new(MockLogSource::CONTRACT, dir.path())
            .start_block(100)
            .batch_size(50)
            .poll_interval(Duration::from_millis(20))
            .retry_backoff(Duration::from_millis(10))
            .storage_retry_delay(Duration::from_millis(1))
            .build(source)
            .unwrap()
    }

    #[tokio::test]
    async fn scan_window_caches_timestamps_per_block() {
        let dir = TempDir::new().unwrap();
        let source = MockLogSource::new();
        source.set_latest(200);
        source.add_log(MockLogSource::raw_log(120, 0));
        source.add_log(MockLogSource::raw_log(120, 1));
        source.add_log(MockLogSource::raw_log(121, 2));
        let scanner = scanner(&dir, source.clone());

        let events = scanner.scan_window(100..=149).await.unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].block_timestamp, MockLogSource::timestamp_of(120));
        assert_eq!(source.timestamp_requests(), vec![120, 121]);
    }

    #[tokio::test]
    async fn scan_window_prefers_timestamp_carried_by_log() {
        let dir = TempDir::new().unwrap();
        let source = MockLogSource::new();
        let mut log = MockLogSource::raw_log(130, 0);
        log.block_timestamp = Some(42);
        source.add_log(log);
        let scanner = scanner(&dir, source.clone());

        let events = scanner.scan_window(100..=149).await.unwrap();

        assert_eq!(events[0].block_timestamp, 42);
        assert!(source.timestamp_requests().is_empty());
    }

    #[tokio::test]
    async fn failed_timestamp_lookup_fails_the_window() {
        let dir = TempDir::new().unwrap();
        let source = MockLogSource::new();
        source.add_log(MockLogSource::raw_log(130, 0));
        source.fail_next_block_timestamp(1);
        let scanner = scanner(&dir, source);

        assert!(scanner.scan_window(100..=149).await.is_err());
        assert_eq!(scanner.scan_window(100..=149).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_flushes_before_checkpointing() {
        let dir = TempDir::new().unwrap();
        let mut scanner = ScannerBuilder::new(MockLogSource::CONTRACT, dir.path())
            .start_block(0)
            .checkpoint_interval(1)
            .build(MockLogSource::new())
            .unwrap();

        let mut log = MockLogSource::raw_log(5, 0);
        log.transaction_hash = B256::repeat_byte(9);
        let event = ClassifiedEvent::new(log, "Unknown", 1);
        scanner.commit_window(&(0..=9), vec![event]).await.unwrap();

        assert!(scanner.writer.is_empty());
        assert_eq!(scanner.checkpoints.persisted(), Some(10));
        assert_eq!(load_event_set(dir.path()).unwrap().len(), 1);
        assert!(dir.path().join(CHECKPOINT_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn cancellation_during_backoff_abandons_window() {
        let dir = TempDir::new().unwrap();
        let source = MockLogSource::new();
        source.add_log(MockLogSource::raw_log(101, 0));
        source.fail_next_get_logs(usize::MAX);
        let mut scanner = ScannerBuilder::new(MockLogSource::CONTRACT, dir.path())
            .start_block(100)
            .retry_backoff(Duration::from_secs(3600))
            .build(source)
            .unwrap();

        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let flow = scanner.scan_to(150, &shutdown).await.unwrap();

        assert!(flow.is_break());
        assert_eq!(scanner.current, 100);
        assert!(scanner.writer.is_empty());
        // backoff restores the state it interrupted
        assert_eq!(scanner.state, ScannerState::Initializing);
    }
}
