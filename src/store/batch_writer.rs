use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;

use super::write_json_atomic;
use crate::{
    IndexerError,
    types::{ClassifiedEvent, DedupKey},
};

/// File name prefix of batch artifacts.
pub const ARTIFACT_PREFIX: &str = "events_";
const ARTIFACT_SUFFIX: &str = ".json";

/// A batch artifact written by [`EventBatchWriter::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchArtifact {
    pub id: u64,
    pub path: PathBuf,
    pub event_count: usize,
}

/// Buffers classified events and persists them as immutable batch artifacts.
///
/// Artifacts are named `events_<id>.json`, where `id` is the creation time in milliseconds,
/// zero-padded to 20 digits so lexicographic order equals write order. Ids are strictly
/// increasing, also across restarts: on open the writer continues after the highest id
/// already present in the directory.
#[derive(Debug)]
pub struct EventBatchWriter {
    output_dir: PathBuf,
    buffer: Vec<ClassifiedEvent>,
    buffered_keys: HashSet<DedupKey>,
    last_artifact_id: u64,
}

impl EventBatchWriter {
    /// Opens a writer on `output_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Io`] if the directory cannot be created or listed.
    pub fn open(output_dir: impl Into<PathBuf>) -> Result<Self, IndexerError> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|e| IndexerError::io(&output_dir, e))?;

        let last_artifact_id = super::artifact_paths(&output_dir)?
            .iter()
            .filter_map(|path| parse_artifact_id(path))
            .max()
            .unwrap_or(0);

        debug!(output_dir = %output_dir.display(), last_artifact_id, "Opened batch writer");

        Ok(Self { output_dir, buffer: Vec::new(), buffered_keys: HashSet::new(), last_artifact_id })
    }

    /// Adds events to the in-memory buffer. Nothing is durable until [`flush`](Self::flush).
    ///
    /// Events whose dedup key is already buffered are dropped. Returns how many were accepted.
    pub fn append(&mut self, events: impl IntoIterator<Item = ClassifiedEvent>) -> usize {
        let before = self.buffer.len();
        for event in events {
            if self.buffered_keys.insert(event.dedup_key()) {
                self.buffer.push(event);
            } else {
                trace!(tx_hash = %event.transaction_hash, log_index = event.log_index, "Dropping duplicate event");
            }
        }
        self.buffer.len() - before
    }

    /// Writes the whole buffer as one new artifact and clears it.
    ///
    /// Returns `None` when the buffer is empty. On error the buffer is left untouched so the
    /// flush can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Io`] or [`IndexerError::Json`] if the artifact cannot be written.
    pub fn flush(&mut self) -> Result<Option<BatchArtifact>, IndexerError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let id = self.next_artifact_id();
        let path = self.output_dir.join(artifact_file_name(id));
        write_json_atomic(&path, &self.buffer)?;

        let event_count = self.buffer.len();
        self.buffer.clear();
        self.buffered_keys.clear();
        self.last_artifact_id = id;

        info!(path = %path.display(), event_count, "Saved batch artifact");
        Ok(Some(BatchArtifact { id, path, event_count }))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn next_artifact_id(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        now.max(self.last_artifact_id + 1)
    }
}

fn artifact_file_name(id: u64) -> String {
    format!("{ARTIFACT_PREFIX}{id:020}{ARTIFACT_SUFFIX}")
}

pub(super) fn is_artifact_name(name: &str) -> bool {
    parse_artifact_name(name).is_some()
}

fn parse_artifact_name(name: &str) -> Option<u64> {
    name.strip_prefix(ARTIFACT_PREFIX)?.strip_suffix(ARTIFACT_SUFFIX)?.parse().ok()
}

pub(super) fn parse_artifact_id(path: &Path) -> Option<u64> {
    parse_artifact_name(path.file_name()?.to_str()?)
}
