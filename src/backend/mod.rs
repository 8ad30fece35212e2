//! Completion backend boundary shared by summarization and retrieval.
//!
//! Every provider implements one primitive, [`CompletionBackend::complete`];
//! the derived `summarise` and `retrieve` operations are built on top of it
//! with fixed prompts, so no provider carries protocol-specific code. The
//! Ollama-backed provider issues HTTP requests directly to the runtime.

mod ollama;

pub use ollama::OllamaBackend;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Fixed system instruction used for per-section summaries.
pub const SUMMARIZE_PROMPT: &str = "\
Act as a document indexer. Provide a 1-2 sentence summary of the text below, optimized for search.
You MUST include key technical terms, proper nouns, and numerical data. Return ONLY the summary text.";

/// Fixed system instruction used for section selection during retrieval.
pub const RETRIEVER_PROMPT: &str = "\
Act as a precise document navigator. Your task is to identify the most relevant sections of a document to answer a user's question.

You will be provided with a Document Map of (ref_id|title|summary) tuples, one per section, indented by hierarchy.

Guidelines:
1. Analyze the user's query and find the sections that contain the direct answer or essential context.
2. Consider the hierarchy: if a parent section's summary is highly relevant, explore its children.
3. Identify all relevant sections across any documents to answer the query.
4. Do not explain your reasoning.
5. Return ONLY a JSON object: {\"ref_ids\": [\"ref_id1/ref_id_a\", \"ref_id2/ref_id_b\"]}

Output Format:
{\"ref_ids\": [\"ref_id1/5\", \"ref_id1/7\"]}";

/// Errors surfaced by completion providers.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Provider was explicitly disabled or unreachable.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by completion providers.
///
/// Concrete backends supply only the text-completion primitive; the derived
/// operations are identical across providers.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run the completion primitive with a system instruction and user text.
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
    -> Result<String, BackendError>;

    /// Summarize one section's text with the fixed indexer instruction.
    async fn summarise(&self, text: &str) -> Result<String, BackendError> {
        self.complete(SUMMARIZE_PROMPT, text).await
    }

    /// Ask the backend to select section identifiers out of a compact map.
    ///
    /// The raw response is treated as free-form text; see [`extract_ref_ids`]
    /// for the defensive parse. Transport errors still propagate so callers
    /// can decide how to degrade.
    async fn retrieve(&self, query: &str, map_text: &str) -> Result<Vec<String>, BackendError> {
        let user_prompt = format!("MAP:\n{map_text}\n\nQUERY: {query}");
        let raw = self.complete(RETRIEVER_PROMPT, &user_prompt).await?;
        Ok(extract_ref_ids(&raw))
    }
}

#[derive(Debug, Deserialize)]
struct Selection {
    #[serde(default)]
    ref_ids: Vec<String>,
}

/// Pull an ordered `ref_ids` selection out of free-form backend text.
///
/// Best effort by design: locate the first balanced brace-delimited substring,
/// strict-parse only that slice, and fall back to the empty selection on any
/// failure. Nothing stronger is assumed about the backend's output grammar.
pub fn extract_ref_ids(text: &str) -> Vec<String> {
    let Some(candidate) = first_balanced_object(text) else {
        tracing::debug!("No object-shaped substring in backend response");
        return Vec::new();
    };
    match serde_json::from_str::<Selection>(candidate) {
        Ok(selection) => selection.ref_ids,
        Err(error) => {
            tracing::debug!(%error, "Backend selection object failed to parse");
            Vec::new()
        }
    }
}

/// Find the first self-contained `{ … }` substring, honoring JSON string
/// syntax so braces inside quoted values do not unbalance the scan.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
