//! Durable output of the indexer: the checkpoint record and the batch artifacts.
//!
//! Both are JSON files under a single output directory. Every write goes to a `.tmp` sibling
//! first and is renamed into place, so a reader never sees a partially written file.

mod batch_writer;
mod checkpoint;
mod reader;

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::IndexerError;

pub use batch_writer::{ARTIFACT_PREFIX, BatchArtifact, EventBatchWriter};
pub use checkpoint::{CHECKPOINT_FILE_NAME, Checkpoint, CheckpointStore};
pub use reader::{artifact_paths, load_event_set};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serializes `value` to `path` via write-to-temp, fsync and rename.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), IndexerError> {
    let tmp = temp_path(path);

    let result = (|| -> Result<(), IndexerError> {
        let file = File::create(&tmp).map_err(|e| IndexerError::io(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush().map_err(|e| IndexerError::io(&tmp, e))?;
        let file = writer.into_inner().map_err(|e| IndexerError::io(&tmp, e.into_error()))?;
        file.sync_all().map_err(|e| IndexerError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| IndexerError::io(path, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn temp_path_is_a_sibling() {
        let path = Path::new("/data/out/events_1.json");
        assert_eq!(temp_path(path), Path::new("/data/out/events_1.json.tmp"));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("record.json");

        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();

        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let parsed: Vec<u32> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);
    }

    #[test]
    fn failed_write_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing-dir").join("record.json");

        let err = write_json_atomic(&path, &1u8).unwrap_err();
        assert!(matches!(err, IndexerError::Io { .. }), "unexpected error {err:?}");
        assert!(!path.exists());
    }
}
