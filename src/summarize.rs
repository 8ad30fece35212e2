//! Bounded-concurrency summarization over a document tree.
//!
//! One unit of work is scheduled per node with non-blank content. Short
//! sections are summarized inline without touching the backend; everything
//! else waits on a counting admission gate, holds a permit for exactly one
//! backend call, and recovers locally on failure so sibling units keep
//! running. The pass returns only once every unit has finished.

use crate::backend::CompletionBackend;
use crate::model::DocumentNode;
use futures_util::future::join_all;
use tokio::sync::Semaphore;

/// Sections shorter than this many characters never reach the backend.
pub const SUMMARY_INLINE_THRESHOLD: usize = 200;
/// Length of the inline snippet used as a short section's summary.
pub const SUMMARY_SNIPPET_CHARS: usize = 50;
/// Default number of simultaneously in-flight backend calls.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Disjoint borrows of the one node a unit is allowed to touch.
///
/// Splitting the node up front is what lets every unit hold `&mut` to its own
/// summary while the pass iterates the whole tree: ownership is 1:1
/// partitioned, so no locking is needed.
struct SummaryUnit<'a> {
    ref_id: &'a str,
    title: &'a str,
    content: &'a str,
    summary: &'a mut String,
}

/// Fill in `summary` for every eligible node under `root`.
///
/// Join semantics: the future resolves only after all scheduled units have
/// completed, successfully or via their local fallback, so callers never
/// observe a partially summarized tree.
pub async fn run_summarization(
    root: &mut DocumentNode,
    backend: &dyn CompletionBackend,
    max_concurrency: usize,
) {
    let gate = Semaphore::new(max_concurrency.max(1));
    let mut units = Vec::new();
    collect_units(root, &mut units);
    if units.is_empty() {
        return;
    }
    tracing::debug!(units = units.len(), max_concurrency, "Summarization pass");
    join_all(
        units
            .into_iter()
            .map(|unit| summarize_unit(unit, &gate, backend)),
    )
    .await;
}

fn collect_units<'a>(node: &'a mut DocumentNode, units: &mut Vec<SummaryUnit<'a>>) {
    let DocumentNode {
        ref_id,
        title,
        content,
        summary,
        children,
        ..
    } = node;
    if !content.trim().is_empty() {
        units.push(SummaryUnit {
            ref_id: ref_id.as_str(),
            title: title.as_str(),
            content: content.as_str(),
            summary,
        });
    }
    for child in children {
        collect_units(child, units);
    }
}

async fn summarize_unit(unit: SummaryUnit<'_>, gate: &Semaphore, backend: &dyn CompletionBackend) {
    if unit.content.chars().count() < SUMMARY_INLINE_THRESHOLD {
        let snippet: String = unit.content.chars().take(SUMMARY_SNIPPET_CHARS).collect();
        *unit.summary = if snippet.is_empty() {
            unit.title.to_string()
        } else {
            snippet
        };
        return;
    }

    // Permit is held for the single backend call and released on every path.
    let _permit = match gate.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            // The gate is never closed while units are running.
            *unit.summary = unit.title.to_string();
            return;
        }
    };

    let text = format!("Title: {}\nContent: {}", unit.title, unit.content);
    match backend.summarise(&text).await {
        Ok(summary) => *unit.summary = summary,
        Err(error) => {
            tracing::error!(ref_id = unit.ref_id, %error, "Failed to summarize section");
            *unit.summary = unit.title.to_string();
        }
    }
}
