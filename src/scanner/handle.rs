use std::fmt;

use alloy::primitives::BlockNumber;
use tokio::{sync::watch, task::JoinHandle};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::IndexerError;

/// Lifecycle state of a [`Scanner`](crate::Scanner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScannerState {
    /// Loading the checkpoint and querying the chain head.
    Initializing,
    /// Catching up from the checkpoint to the head observed at startup.
    Backfilling,
    /// Caught up; polling for new blocks.
    LivePolling,
    /// Waiting out the retry backoff after a chain source failure.
    ErrorBackoff,
    /// The final flush and checkpoint have been attempted. Terminal.
    Stopped,
}

impl fmt::Display for ScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScannerState::Initializing => "initializing",
            ScannerState::Backfilling => "backfilling",
            ScannerState::LivePolling => "live_polling",
            ScannerState::ErrorBackoff => "error_backoff",
            ScannerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Snapshot of scanner progress, published after every state change and window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub state: ScannerState,
    /// First block not yet processed.
    pub next_block: BlockNumber,
    /// Most recent chain head observed, if any.
    pub latest_block: Option<BlockNumber>,
    /// Events appended but not yet written to an artifact.
    pub buffered_events: usize,
    /// Events accepted into the buffer since start.
    pub events_indexed: u64,
    /// Batch artifacts written since start.
    pub artifacts_written: u64,
    /// Highest `next_block` known to be persisted.
    pub checkpointed_block: Option<BlockNumber>,
}

impl Progress {
    pub(crate) fn new(next_block: BlockNumber) -> Self {
        Self {
            state: ScannerState::Initializing,
            next_block,
            latest_block: None,
            buffered_events: 0,
            events_indexed: 0,
            artifacts_written: 0,
            checkpointed_block: None,
        }
    }

    /// Whether every block up to the observed head has been processed.
    #[must_use]
    pub fn is_caught_up(&self) -> bool {
        self.latest_block.is_some_and(|latest| self.next_block > latest)
    }
}

/// Outcome of a scanner run that stopped cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// `next_block` of the final checkpoint.
    pub next_block: BlockNumber,
    pub windows_processed: u64,
    pub events_indexed: u64,
    pub artifacts_written: u64,
}

/// Handle to a scanner running in a background task.
///
/// Returned by [`Scanner::start`](crate::Scanner::start). Dropping the handle does not stop the
/// scanner; call [`stop`](Self::stop) (or cancel the [`shutdown_token`](Self::shutdown_token)).
#[derive(Debug)]
pub struct ScannerHandle {
    shutdown: CancellationToken,
    progress: watch::Receiver<Progress>,
    task: JoinHandle<Result<ScanSummary, IndexerError>>,
}

impl ScannerHandle {
    pub(crate) fn new(
        shutdown: CancellationToken,
        progress: watch::Receiver<Progress>,
        task: JoinHandle<Result<ScanSummary, IndexerError>>,
    ) -> Self {
        Self { shutdown, progress, task }
    }

    /// Latest published progress.
    #[must_use]
    pub fn progress(&self) -> Progress {
        self.progress.borrow().clone()
    }

    #[must_use]
    pub fn state(&self) -> ScannerState {
        self.progress.borrow().state
    }

    /// Stream of progress snapshots. Intermediate values may be skipped; the latest is always
    /// observed.
    #[must_use]
    pub fn progress_stream(&self) -> WatchStream<Progress> {
        WatchStream::new(self.progress.clone())
    }

    /// Waits until the published progress satisfies `predicate`.
    ///
    /// If the scanner task ends first, the last published progress is returned.
    pub async fn wait_until(&self, mut predicate: impl FnMut(&Progress) -> bool) -> Progress {
        let mut progress = self.progress.clone();
        let matched = progress.wait_for(|p| predicate(p)).await.map(|p| (*p).clone());
        match matched {
            Ok(p) => p,
            Err(_) => progress.borrow().clone(),
        }
    }

    /// Token that stops the scanner when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the scanner to stop and waits for the final flush and checkpoint.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the run, if any.
    pub async fn stop(self) -> Result<ScanSummary, IndexerError> {
        self.shutdown.cancel();
        self.wait().await
    }

    /// Waits for the scanner to finish without signalling it.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the run, or [`IndexerError::TaskFailed`] if the task
    /// panicked or was aborted.
    pub async fn wait(self) -> Result<ScanSummary, IndexerError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(IndexerError::TaskFailed(e.to_string())),
        }
    }
}
