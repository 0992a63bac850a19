use std::{path::PathBuf, sync::Arc};

use alloy::primitives::BlockNumber;
use thiserror::Error;

use crate::log_source;

/// Errors emitted by the indexer.
///
/// Chain source failures never reach the caller of [`Scanner::run`](crate::Scanner::run): they
/// are absorbed by the retry loop. What does surface is invalid configuration at build time and
/// storage failures that persisted past every retry.
#[derive(Error, Debug, Clone)]
pub enum IndexerError {
    /// The chain log source failed.
    #[error("Log source error: {0}")]
    Source(#[from] log_source::Error),

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A record could not be serialized.
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    /// A checkpoint save would move `next_block` backwards.
    #[error("Checkpoint regression: next_block {attempted} is below persisted {persisted}")]
    CheckpointRegression { attempted: BlockNumber, persisted: BlockNumber },

    /// Writing a batch artifact or checkpoint kept failing.
    #[error("Storage write failed after {attempts} attempts: {last_error}")]
    StorageExhausted { attempts: usize, last_error: Box<IndexerError> },

    /// The configured window size is invalid (must be greater than zero).
    #[error("Batch size must be greater than 0")]
    InvalidBatchSize,

    /// The configured flush threshold is invalid (must be greater than zero).
    #[error("Flush threshold must be greater than 0")]
    InvalidFlushThreshold,

    /// The configured checkpoint interval is invalid (must be greater than zero).
    #[error("Checkpoint interval must be greater than 0")]
    InvalidCheckpointInterval,

    /// A configuration value could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The background scanner task panicked or was aborted.
    #[error("Scanner task failed: {0}")]
    TaskFailed(String),
}

impl IndexerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexerError::Io { path: path.into(), source: Arc::new(source) }
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(error: serde_json::Error) -> Self {
        IndexerError::Json(Arc::new(error))
    }
}
