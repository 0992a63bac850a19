use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use alloy::primitives::BlockNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::write_json_atomic;
use crate::IndexerError;

/// File name of the checkpoint record inside the output directory.
pub const CHECKPOINT_FILE_NAME: &str = "indexer_state.json";

/// Scan progress: every block below `next_block` has been indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub next_block: BlockNumber,
    pub last_updated: DateTime<Utc>,
}

impl Checkpoint {
    #[must_use]
    pub fn new(next_block: BlockNumber) -> Self {
        Self { next_block, last_updated: Utc::now() }
    }
}

/// Durable, single-record store for the [`Checkpoint`].
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    start_block: BlockNumber,
    persisted: Option<BlockNumber>,
}

impl CheckpointStore {
    /// Creates a store for `<output_dir>/indexer_state.json`. `start_block` seeds the checkpoint
    /// when no usable record exists.
    #[must_use]
    pub fn new(output_dir: impl AsRef<Path>, start_block: BlockNumber) -> Self {
        Self {
            path: output_dir.as_ref().join(CHECKPOINT_FILE_NAME),
            start_block,
            persisted: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted checkpoint.
    ///
    /// A missing, unreadable or corrupt record is not an error: it is logged and the store falls
    /// back to a checkpoint at the configured start block.
    pub fn load(&mut self) -> Checkpoint {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(start_block = self.start_block, "No checkpoint found, starting fresh");
                return Checkpoint::new(self.start_block);
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read checkpoint, starting fresh");
                return Checkpoint::new(self.start_block);
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                info!(
                    next_block = checkpoint.next_block,
                    last_updated = %checkpoint.last_updated,
                    "Loaded checkpoint"
                );
                self.persisted = Some(checkpoint.next_block);
                checkpoint
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt checkpoint, starting fresh");
                Checkpoint::new(self.start_block)
            }
        }
    }

    /// Atomically replaces the persisted checkpoint.
    ///
    /// # Errors
    ///
    /// * [`IndexerError::CheckpointRegression`] if `checkpoint.next_block` is below the last
    ///   loaded or saved value.
    /// * [`IndexerError::Io`] / [`IndexerError::Json`] if the record cannot be written.
    pub fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), IndexerError> {
        if let Some(persisted) = self.persisted
            && checkpoint.next_block < persisted
        {
            return Err(IndexerError::CheckpointRegression {
                attempted: checkpoint.next_block,
                persisted,
            });
        }

        write_json_atomic(&self.path, checkpoint)?;
        self.persisted = Some(checkpoint.next_block);
        debug!(next_block = checkpoint.next_block, "Checkpoint saved");
        Ok(())
    }

    /// Last `next_block` known to be on disk.
    #[must_use]
    pub fn persisted(&self) -> Option<BlockNumber> {
        self.persisted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_record_seeds_from_start_block() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::new(tmp.path(), 7_039_846);

        assert_eq!(store.load().next_block, 7_039_846);
        assert_eq!(store.persisted(), None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::new(tmp.path(), 100);
        store.save(&Checkpoint::new(150)).unwrap();

        let mut reopened = CheckpointStore::new(tmp.path(), 100);
        assert_eq!(reopened.load().next_block, 150);
        assert_eq!(reopened.persisted(), Some(150));
    }

    #[test]
    fn corrupt_record_falls_back_to_start_block() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CHECKPOINT_FILE_NAME), "{\"next_block\": \"oops\"").unwrap();

        let mut store = CheckpointStore::new(tmp.path(), 100);
        assert_eq!(store.load().next_block, 100);
        assert_eq!(store.persisted(), None);

        // a fresh save replaces the corrupt record
        store.save(&Checkpoint::new(120)).unwrap();
        assert_eq!(CheckpointStore::new(tmp.path(), 100).load().next_block, 120);
    }

    #[test]
    fn record_has_expected_shape() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::new(tmp.path(), 0);
        store.save(&Checkpoint::new(42)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value["next_block"], 42);
        assert!(value["last_updated"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn next_block_never_decreases() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::new(tmp.path(), 0);

        store.save(&Checkpoint::new(200)).unwrap();
        store.save(&Checkpoint::new(200)).unwrap();
        let err = store.save(&Checkpoint::new(199)).unwrap_err();

        assert!(matches!(
            err,
            IndexerError::CheckpointRegression { attempted: 199, persisted: 200 }
        ));
        assert_eq!(CheckpointStore::new(tmp.path(), 0).load().next_block, 200);
    }

    #[test]
    fn regression_guard_applies_to_loaded_record() {
        let tmp = TempDir::new().unwrap();
        CheckpointStore::new(tmp.path(), 0).save(&Checkpoint::new(300)).unwrap();

        let mut store = CheckpointStore::new(tmp.path(), 0);
        store.load();
        assert!(store.save(&Checkpoint::new(250)).is_err());
        assert!(store.save(&Checkpoint::new(301)).is_ok());
    }
}
