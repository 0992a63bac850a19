//! Event-Indexer is a resumable, checkpointed indexer for EVM contract event logs.
//!
//! The main entry point is [`Scanner`], built via [`ScannerBuilder`] over any
//! [`ChainLogSource`]. The production source is [`RpcLogSource`], which talks JSON-RPC through
//! alloy with per-call timeouts, retries and fallback endpoints.
//!
//! A scanner backfills from its checkpoint to the chain head in fixed-size block windows, then
//! polls for new blocks. Every log is classified by its signature topic ([`EventClassifier`]) and
//! buffered; the buffer is written as immutable JSON batch artifacts by the
//! [`EventBatchWriter`], and progress is persisted by the [`CheckpointStore`].
//!
//! # Output layout
//!
//! ```text
//! <output_dir>/
//!   indexer_state.json                      {"next_block": .., "last_updated": ..}
//!   events_00000001726000000000.json        [ClassifiedEvent, ..]
//!   events_00000001726000060000.json
//! ```
//!
//! # Delivery guarantees
//!
//! Events are delivered at least once. A restart resumes at the persisted checkpoint, which may
//! be behind the last written artifact, so artifacts can overlap. [`load_event_set`] unions all
//! artifacts by `(transaction_hash, log_index)` and is the canonical read path.
//!
//! # Stopping
//!
//! [`Scanner::start`] returns a [`ScannerHandle`]. [`ScannerHandle::stop`] flushes buffered
//! events, persists the final checkpoint and returns a [`ScanSummary`].

#[macro_use]
mod logging;

pub mod classifier;
pub mod config;
pub mod log_source;
pub mod scanner;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod error;
mod types;

pub use classifier::{EventClassifier, NEUROLEND_EVENT_SIGNATURES};
pub use config::IndexerConfig;
pub use error::IndexerError;
pub use log_source::{ChainLogSource, RpcLogSource, RpcLogSourceBuilder};
pub use scanner::{
    DEFAULT_BATCH_SIZE, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_FLUSH_THRESHOLD, Progress,
    ScanSummary, Scanner, ScannerBuilder, ScannerHandle, ScannerState,
};
pub use store::{
    BatchArtifact, Checkpoint, CheckpointStore, EventBatchWriter, artifact_paths, load_event_set,
};
pub use types::{ClassifiedEvent, DedupKey, RawLog, UNKNOWN_EVENT};
