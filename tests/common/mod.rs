#![allow(dead_code)]

use std::{fs, path::Path, time::Duration};

use alloy::primitives::BlockNumber;
use event_indexer::{
    CheckpointStore, ClassifiedEvent, ScannerBuilder, artifact_paths, store::CHECKPOINT_FILE_NAME,
    test_utils::MockLogSource,
};
use tempfile::TempDir;

pub const START_BLOCK: BlockNumber = 100;
pub const WINDOW: u64 = 50;

pub struct IndexerSetup {
    pub dir: TempDir,
    pub source: MockLogSource,
}

impl IndexerSetup {
    pub fn output_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Builder with the default test parameters: start block 100, windows of 50 blocks and
    /// millisecond timers.
    pub fn builder(&self) -> ScannerBuilder {
        scanner_builder(self.output_dir())
    }
}

/// A chain whose head is `latest`, with one classifiable log at each of `log_blocks`.
pub fn setup(latest: BlockNumber, log_blocks: impl IntoIterator<Item = BlockNumber>) -> IndexerSetup {
    let dir = TempDir::new().expect("failed to create temp dir");
    let source = MockLogSource::new();
    source.set_latest(latest);
    source.add_logs_at(log_blocks);
    IndexerSetup { dir, source }
}

pub fn scanner_builder(output_dir: &Path) -> ScannerBuilder {
    ScannerBuilder::new(MockLogSource::CONTRACT, output_dir)
        .start_block(START_BLOCK)
        .batch_size(WINDOW)
        .poll_interval(Duration::from_millis(20))
        .retry_backoff(Duration::from_millis(10))
        .flush_interval(Duration::from_secs(3600))
        .storage_retries(2)
        .storage_retry_delay(Duration::from_millis(1))
}

/// `next_block` of the checkpoint on disk, if any.
pub fn read_checkpoint(output_dir: &Path) -> Option<BlockNumber> {
    let mut store = CheckpointStore::new(output_dir, BlockNumber::MAX);
    let checkpoint = store.load();
    (checkpoint.next_block != BlockNumber::MAX).then_some(checkpoint.next_block)
}

/// Overwrites the checkpoint record, bypassing the regression guard of a running store.
pub fn write_checkpoint(output_dir: &Path, next_block: BlockNumber) {
    let path = output_dir.join(CHECKPOINT_FILE_NAME);
    fs::write(
        path,
        format!(r#"{{"next_block": {next_block}, "last_updated": "2024-01-01T00:00:00Z"}}"#),
    )
    .expect("failed to write checkpoint");
}

/// Every record of every artifact, duplicates included.
pub fn raw_artifact_records(output_dir: &Path) -> Vec<ClassifiedEvent> {
    artifact_paths(output_dir)
        .expect("failed to list artifacts")
        .iter()
        .flat_map(|path| {
            let content = fs::read_to_string(path).expect("failed to read artifact");
            serde_json::from_str::<Vec<ClassifiedEvent>>(&content).expect("corrupt artifact")
        })
        .collect()
}
