//! Atomic durable persistence of the corpus state.
//!
//! The artifact is a JSON document with exactly two top-level fields,
//! `documents` and `indexes`. Saves go through a temporary file that is
//! fsynced and atomically renamed over the destination; a failed save removes
//! the temporary file and propagates, so the previously persisted artifact is
//! never half-overwritten. Loads never default to an empty state: a missing or
//! malformed artifact is the caller's problem to surface.

use crate::model::NodeRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default location of the persisted state artifact.
pub const DEFAULT_STATE_FILE: &str = "rustyrag_state.json";

/// Errors raised while persisting or restoring the corpus.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No artifact exists at the given location.
    #[error("State file not found: '{0}'")]
    NotFound(PathBuf),
    /// Artifact exists but cannot be parsed as a corpus state.
    #[error("Invalid state format in '{path}': {source}")]
    Format {
        /// Location of the malformed artifact.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// In-memory state could not be serialized.
    #[error("Failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
    /// Filesystem operation failed.
    #[error("State I/O failed for '{path}': {source}")]
    Io {
        /// Path the failing operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Corpus-level mappings accumulated across ingestions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusState {
    /// `doc_id → compact encoding` for every ingested document.
    pub documents: BTreeMap<String, String>,
    /// `ref_id → flat record` across the whole corpus.
    pub indexes: BTreeMap<String, NodeRecord>,
}

/// Serialize the state to `<path>.tmp`, force it durable, then atomically
/// replace the destination. Any failure removes the temporary file and
/// propagates; partial or silent persistence is disallowed.
pub fn save(path: &Path, state: &CorpusState) -> Result<(), StoreError> {
    let temp = temp_path(path);
    if let Err(error) = write_durable(&temp, state).and_then(|()| {
        fs::rename(&temp, path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }) {
        let _ = fs::remove_file(&temp);
        return Err(error);
    }
    tracing::info!(path = %path.display(), "Saved corpus state");
    Ok(())
}

/// Restore a corpus state from the artifact at `path`.
pub fn load(path: &Path) -> Result<CorpusState, StoreError> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.to_path_buf())
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let state: CorpusState = serde_json::from_str(&raw).map_err(|source| StoreError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(
        path = %path.display(),
        documents = state.documents.len(),
        indexes = state.indexes.len(),
        "Loaded corpus state"
    );
    Ok(state)
}

fn write_durable(temp: &Path, state: &CorpusState) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(state).map_err(StoreError::Serialize)?;
    let io_error = |source| StoreError::Io {
        path: temp.to_path_buf(),
        source,
    };
    let mut file = File::create(temp).map_err(io_error)?;
    file.write_all(&json).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_owned();
    os_string.push(".tmp");
    PathBuf::from(os_string)
}
