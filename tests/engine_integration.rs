//! End-to-end tests driving the engine with scripted collaborators.

use async_trait::async_trait;
use rustyrag::backend::{BackendError, CompletionBackend, RETRIEVER_PROMPT};
use rustyrag::engine::Engine;
use rustyrag::structuring::{DocumentItem, DocumentStructurer, ItemKind, StructuringError, doc_hash};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;

/// Backend double: answers retrieval calls with a scripted raw response and
/// summarization calls with a canned summary, tracking the in-flight
/// high-water mark across concurrent calls.
struct ScriptedBackend {
    retrieval_response: Mutex<String>,
    summary_calls: AtomicUsize,
    retrieval_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedBackend {
    fn new(retrieval_response: &str) -> Self {
        Self {
            retrieval_response: Mutex::new(retrieval_response.to_string()),
            summary_calls: AtomicUsize::new(0),
            retrieval_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn set_retrieval_response(&self, response: &str) {
        *self.retrieval_response.lock().expect("lock") = response.to_string();
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        system_prompt: &str,
        _user_prompt: &str,
    ) -> Result<String, BackendError> {
        if system_prompt == RETRIEVER_PROMPT {
            self.retrieval_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(self.retrieval_response.lock().expect("lock").clone());
        }

        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok("Keyword-dense generated summary with numbers: 42.".to_string())
    }
}

/// Adapter letting a test keep hold of the scripted backend after the engine
/// takes ownership of its own handle.
struct SharedBackend(std::sync::Arc<ScriptedBackend>);

#[async_trait]
impl CompletionBackend for SharedBackend {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, BackendError> {
        self.0.complete(system_prompt, user_prompt).await
    }
}

/// Structurer double emitting a fixed item stream per known source.
struct ScriptedStructurer {
    items: Vec<DocumentItem>,
}

impl ScriptedStructurer {
    fn new(items: Vec<DocumentItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl DocumentStructurer for ScriptedStructurer {
    async fn structure(&self, source: &str) -> Result<Vec<DocumentItem>, StructuringError> {
        if source == "broken.pdf" {
            return Err(StructuringError::UnsupportedFormat(source.to_string()));
        }
        Ok(self.items.clone())
    }
}

fn heading(local_id: &str, level: usize, text: &str) -> DocumentItem {
    DocumentItem {
        local_id: local_id.into(),
        page: Some(1),
        kind: ItemKind::Heading {
            level,
            text: text.into(),
        },
    }
}

fn paragraph(local_id: &str, text: &str) -> DocumentItem {
    DocumentItem {
        local_id: local_id.into(),
        page: Some(1),
        kind: ItemKind::Paragraph { text: text.into() },
    }
}

fn long_body() -> String {
    let mut body = String::from("Docling supports PDF, DOCX, XLSX, HTML, and image formats. ");
    while body.chars().count() < 200 {
        body.push_str("It exports structured trees with headings, tables, and code blocks. ");
    }
    body
}

fn sample_items() -> Vec<DocumentItem> {
    vec![
        heading("2", 1, "Supported Formats"),
        paragraph("3", &long_body()),
        heading("4", 1, "Installation"),
        paragraph("5", "pip install docling"),
    ]
}

#[tokio::test]
async fn retrieval_against_empty_corpus_skips_the_backend() {
    let backend = std::sync::Arc::new(ScriptedBackend::new(r#"{"ref_ids": []}"#));
    let structurer = Box::new(ScriptedStructurer::new(Vec::new()));
    let engine = Engine::new(Box::new(SharedBackend(backend.clone())), structurer);

    let results = engine.retrieve("anything").await;

    assert!(results.is_empty());
    assert_eq!(engine.documents().len(), 0);
    assert_eq!(backend.retrieval_calls.load(Ordering::SeqCst), 0);
    assert_eq!(backend.summary_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn summarization_never_exceeds_the_concurrency_bound() {
    let mut items = Vec::new();
    for index in 0..8 {
        items.push(heading(&format!("h{index}"), 1, &format!("Section {index}")));
        items.push(paragraph(&format!("p{index}"), &long_body()));
    }
    let backend = std::sync::Arc::new(
        ScriptedBackend::new(r#"{"ref_ids": []}"#).with_delay(Duration::from_millis(25)),
    );
    let mut engine = Engine::new(
        Box::new(SharedBackend(backend.clone())),
        Box::new(ScriptedStructurer::new(items)),
    )
    .with_max_concurrency(3);

    engine.ingest_one("many-sections.pdf").await.expect("ingest");

    let max_seen = backend.max_in_flight.load(Ordering::SeqCst);
    assert_eq!(backend.summary_calls.load(Ordering::SeqCst), 8);
    assert!(max_seen <= 3, "saw {max_seen} concurrent backend calls");
    assert!(max_seen >= 2, "expected some overlap, saw {max_seen}");
}

#[tokio::test]
async fn ingest_summarize_save_load_retrieve_round_trip() {
    let source = "https://example.com/docling.pdf";
    let doc_id = doc_hash(source);
    let section_ref = format!("{doc_id}/2");
    let backend = Box::new(ScriptedBackend::new(&format!(
        "Relevant sections follow. {{\"ref_ids\": [\"{section_ref}\"]}}"
    )));
    let structurer = Box::new(ScriptedStructurer::new(sample_items()));
    let mut engine = Engine::new(backend, structurer);

    engine.ingest_one(source).await.expect("ingest");

    // The long section got a backend summary; the short one stayed inline.
    // Cloned so the record survives the mutable `load_state` borrow below.
    let section = engine
        .indexes()
        .get(&section_ref)
        .expect("section record")
        .clone();
    assert!(!section.summary.is_empty());
    assert!(section.summary.contains("42"));
    let install = engine
        .indexes()
        .get(&format!("{doc_id}/4"))
        .expect("install record");
    assert_eq!(install.summary, "pip install docling\n");

    // Persistence round trip reproduces both maps exactly.
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("state.json");
    engine.save_state(&path).expect("save");
    let documents_before = engine.documents().clone();
    let indexes_before = engine.indexes().clone();
    engine.load_state(&path).expect("load");
    assert_eq!(engine.documents(), &documents_before);
    assert_eq!(engine.indexes(), &indexes_before);

    // Retrieval resolves the backend's selection to raw section content.
    let results = engine.retrieve("Which formats does Docling support?").await;
    assert_eq!(results.len(), 1);
    assert!(results[0].starts_with("Docling supports PDF, DOCX"));
    assert_eq!(results[0], section.content);
}

#[tokio::test]
async fn unknown_selected_ids_are_skipped_not_fatal() {
    let source = "known.pdf";
    let doc_id = doc_hash(source);
    let backend = ScriptedBackend::new("placeholder");
    backend.set_retrieval_response(&format!(
        "{{\"ref_ids\": [\"{doc_id}/2\", \"missing/9\"]}}"
    ));
    let mut engine = Engine::new(
        Box::new(backend),
        Box::new(ScriptedStructurer::new(sample_items())),
    );

    engine.ingest_one(source).await.expect("ingest");
    let results = engine.retrieve("query").await;

    assert_eq!(results.len(), 1);
    assert!(results[0].starts_with("Docling supports"));
}

#[tokio::test]
async fn duplicate_selections_yield_duplicate_outputs() {
    let source = "dup.pdf";
    let doc_id = doc_hash(source);
    let backend = ScriptedBackend::new("placeholder");
    backend.set_retrieval_response(&format!(
        "{{\"ref_ids\": [\"{doc_id}/2\", \"{doc_id}/2\"]}}"
    ));
    let mut engine = Engine::new(
        Box::new(backend),
        Box::new(ScriptedStructurer::new(sample_items())),
    );

    engine.ingest_one(source).await.expect("ingest");
    let results = engine.retrieve("query").await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0], results[1]);
}

#[tokio::test]
async fn unparseable_selection_degrades_to_empty_result() {
    let backend = ScriptedBackend::new("I could not find anything useful, sorry!");
    let mut engine = Engine::new(
        Box::new(backend),
        Box::new(ScriptedStructurer::new(sample_items())),
    );

    engine.ingest_one("doc.pdf").await.expect("ingest");
    assert!(engine.retrieve("query").await.is_empty());
}

#[tokio::test]
async fn failed_source_keeps_earlier_sources_committed() {
    let backend = Box::new(ScriptedBackend::new(r#"{"ref_ids": []}"#));
    let structurer = Box::new(ScriptedStructurer::new(sample_items()));
    let mut engine = Engine::new(backend, structurer);

    let result = engine.ingest(["good.pdf", "broken.pdf", "never.pdf"]).await;

    assert!(result.is_err());
    assert_eq!(engine.documents().len(), 1);
    assert!(engine.documents().contains_key(&doc_hash("good.pdf")));
    assert!(!engine.documents().contains_key(&doc_hash("never.pdf")));
}

#[tokio::test]
async fn reingesting_a_source_overwrites_its_document_entry() {
    let source = "same.pdf";
    let backend = Box::new(ScriptedBackend::new(r#"{"ref_ids": []}"#));
    let structurer = Box::new(ScriptedStructurer::new(sample_items()));
    let mut engine = Engine::new(backend, structurer);

    engine.ingest_one(source).await.expect("first ingest");
    engine.ingest_one(source).await.expect("second ingest");

    assert_eq!(engine.documents().len(), 1);
}
