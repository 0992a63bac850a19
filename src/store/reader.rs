use std::{
    collections::HashSet,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use super::batch_writer::{is_artifact_name, parse_artifact_id};
use crate::{IndexerError, types::ClassifiedEvent};

/// Lists batch artifacts in `output_dir`, in write order. A missing directory has none.
///
/// # Errors
///
/// Returns [`IndexerError::Io`] if the directory exists but cannot be listed.
pub fn artifact_paths(output_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, IndexerError> {
    let output_dir = output_dir.as_ref();
    let entries = match fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(IndexerError::io(output_dir, e)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IndexerError::io(output_dir, e))?;
        if entry.file_name().to_str().is_some_and(is_artifact_name) {
            paths.push(entry.path());
        }
    }
    // unpadded names from older runs do not sort by id as strings
    paths.sort_by_cached_key(|path| (parse_artifact_id(path), path.clone()));
    Ok(paths)
}

/// Loads the canonical event set: every artifact, unioned by dedup key.
///
/// The first occurrence of a key (in write order) wins. The result is sorted by
/// `(block_number, log_index)`. Artifacts that cannot be read or parsed are logged and skipped.
///
/// # Errors
///
/// Returns [`IndexerError::Io`] if the directory cannot be listed.
pub fn load_event_set(output_dir: impl AsRef<Path>) -> Result<Vec<ClassifiedEvent>, IndexerError> {
    let mut seen = HashSet::new();
    let mut events = Vec::new();
    let mut total = 0usize;

    for path in artifact_paths(output_dir)? {
        let batch = match read_artifact(&path) {
            Ok(batch) => batch,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load artifact");
                continue;
            }
        };
        total += batch.len();
        events.extend(batch.into_iter().filter(|event| seen.insert(event.dedup_key())));
    }

    events.sort_by_key(|event| (event.block_number, event.log_index));
    debug!(total, unique = events.len(), "Loaded event set");
    Ok(events)
}

fn read_artifact(path: &Path) -> Result<Vec<ClassifiedEvent>, IndexerError> {
    let content = fs::read_to_string(path).map_err(|e| IndexerError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}
