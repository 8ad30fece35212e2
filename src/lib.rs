#![deny(missing_docs)]

//! Core library for the Rusty RAG hierarchical index engine.

/// Completion backend contract and the Ollama provider.
pub mod backend;
/// Environment-driven configuration management.
pub mod config;
/// Ingestion and retrieval coordination over the corpus.
pub mod engine;
/// Structured logging and tracing setup.
pub mod logging;
/// Document tree entity and its derived serializations.
pub mod model;
/// Atomic durable persistence of the corpus state.
pub mod store;
/// Tree construction from the structurer's item stream.
pub mod structuring;
/// Bounded-concurrency summarization pass.
pub mod summarize;
