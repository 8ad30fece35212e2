//! Engine coordinating ingestion, retrieval, and state persistence.
//!
//! The engine owns the completion backend and the structurer boundary, plus
//! the corpus aggregate they feed: `documents` (doc_id → compact encoding)
//! and `indexes` (ref_id → flat record). Construct it once near process start
//! and drive it for the process lifetime; the aggregate only leaves memory
//! through the explicit save/load operations.

use crate::backend::CompletionBackend;
use crate::model::NodeRecord;
use crate::store::{self, CorpusState, StoreError};
use crate::structuring::{DocumentStructurer, StructuringError, build_tree, doc_hash};
use crate::summarize::{DEFAULT_MAX_CONCURRENCY, run_summarization};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors surfaced by the ingestion and persistence entry points.
///
/// Backend failures never appear here: summarization recovers per node and
/// retrieval degrades to an empty selection.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The structurer could not produce an item stream for a source.
    #[error("Failed to structure document: {0}")]
    Structuring(#[from] StructuringError),
    /// Persisting or restoring the corpus state failed.
    #[error("State persistence failed: {0}")]
    Store(#[from] StoreError),
}

/// Hierarchical index engine over a completion backend.
pub struct Engine {
    backend: Box<dyn CompletionBackend>,
    structurer: Box<dyn DocumentStructurer>,
    max_concurrency: usize,
    state: CorpusState,
}

impl Engine {
    /// Build an engine with the default summarization concurrency bound.
    pub fn new(backend: Box<dyn CompletionBackend>, structurer: Box<dyn DocumentStructurer>) -> Self {
        Self {
            backend,
            structurer,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            state: CorpusState::default(),
        }
    }

    /// Build an engine honoring the loaded configuration's concurrency bound.
    ///
    /// Requires [`crate::config::init_config`] to have run; unset values fall
    /// back to the crate defaults. Pair with
    /// [`crate::config::Config::state_path`] for the persistence location.
    pub fn from_config(
        backend: Box<dyn CompletionBackend>,
        structurer: Box<dyn DocumentStructurer>,
    ) -> Self {
        let engine = Self::new(backend, structurer);
        match crate::config::get_config().max_concurrency {
            Some(bound) => engine.with_max_concurrency(bound),
            None => engine,
        }
    }

    /// Override the number of simultaneously in-flight backend calls.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Ingest one source: structure, build the tree, summarize to completion,
    /// then merge both derived forms into the corpus.
    ///
    /// Re-ingesting a source overwrites its `documents` entry silently.
    pub async fn ingest_one(&mut self, source: &str) -> Result<(), EngineError> {
        let doc_id = doc_hash(source);
        tracing::info!(source, doc_id, "Starting document conversion");
        let items = self.structurer.structure(source).await?;
        let mut root = build_tree(&doc_id, items);
        tracing::info!(doc_id, "Starting concurrent summarization");
        run_summarization(&mut root, self.backend.as_ref(), self.max_concurrency).await;
        self.state
            .documents
            .insert(doc_id.clone(), root.compact_encoding());
        self.state.indexes.extend(root.index_records());
        tracing::info!(source, doc_id, "Document indexed");
        Ok(())
    }

    /// Ingest many sources, each independently and sequentially.
    ///
    /// No rollback: the first failure propagates, and every source processed
    /// before it stays committed in the corpus.
    pub async fn ingest<I, S>(&mut self, sources: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for source in sources {
            self.ingest_one(source.as_ref()).await?;
        }
        Ok(())
    }

    /// Answer a free-text query with the raw content of the sections the
    /// backend selects, in selection order.
    ///
    /// An empty corpus short-circuits to an empty result without contacting
    /// the backend. Backend failures and unparseable selections degrade to an
    /// empty result; selected ids missing from the index are skipped with a
    /// warning.
    pub async fn retrieve(&self, query: &str) -> Vec<String> {
        if self.state.documents.is_empty() {
            tracing::info!("No documents ingested yet");
            return Vec::new();
        }

        let mut map_text = String::new();
        for (doc_id, encoding) in &self.state.documents {
            map_text.push_str(&format!("\n=== DOCUMENT ID: {doc_id} ===\n{encoding}"));
        }

        let selected = match self.backend.retrieve(query, &map_text).await {
            Ok(ids) => ids,
            Err(error) => {
                tracing::error!(%error, "Retrieval call failed; returning empty selection");
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        for ref_id in selected {
            match self.state.indexes.get(&ref_id) {
                Some(record) if !record.content.is_empty() => {
                    results.push(record.content.clone());
                }
                Some(_) => {}
                None => tracing::warn!(ref_id, "Selected id not found in index"),
            }
        }
        results
    }

    /// Persist the corpus aggregate to `path` atomically.
    pub fn save_state(&self, path: &Path) -> Result<(), EngineError> {
        store::save(path, &self.state)?;
        Ok(())
    }

    /// Replace the corpus aggregate wholesale with the artifact at `path`.
    pub fn load_state(&mut self, path: &Path) -> Result<(), EngineError> {
        self.state = store::load(path)?;
        Ok(())
    }

    /// Compact encodings per ingested document.
    pub fn documents(&self) -> &BTreeMap<String, String> {
        &self.state.documents
    }

    /// Flat records across the whole corpus.
    pub fn indexes(&self) -> &BTreeMap<String, NodeRecord> {
        &self.state.indexes
    }
}
