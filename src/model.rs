//! Core tree entity for ingested documents and its two derived serializations.
//!
//! A [`DocumentNode`] is created once by structuring, mutated exactly once (the
//! `summary` field) by the summarization pass, then frozen into a compact
//! encoding and a set of flat records at ingestion time. The compact encoding
//! feeds retrieval prompts; the flat records resolve selected identifiers back
//! to full text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A document root or one structural section of it.
///
/// `ref_id` is the corpus-unique hierarchical path (`<doc_hash>` for a root,
/// `<doc_hash>/<local_id>` for a descendant). `parent_id` is a lookup key back
/// to the parent, never an ownership edge; children are exclusively owned by
/// their parent, in document order.
#[derive(Debug, Clone, Default)]
pub struct DocumentNode {
    /// Globally unique hierarchical path of this node.
    pub ref_id: String,
    /// `ref_id` of the parent node; empty for a root.
    pub parent_id: String,
    /// Heading depth; used only while building the tree, absent from both
    /// derived forms.
    pub level: usize,
    /// Heading text; empty for a root.
    pub title: String,
    /// Raw body text accumulated before the next same-or-shallower heading.
    pub content: String,
    /// Machine-generated summary; empty until the summarization pass runs.
    pub summary: String,
    /// First page the node's content appeared on, when known.
    pub page_index: Option<usize>,
    /// Child sections in document order.
    pub children: Vec<DocumentNode>,
}

/// Flat per-`ref_id` record used to resolve retrieval selections.
///
/// Carries every node field except `children` and the construction-only
/// `level`, including the raw content the compact encoding leaves out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Globally unique hierarchical path of the node.
    pub ref_id: String,
    /// `ref_id` of the parent node; empty for a root.
    pub parent_id: String,
    /// Heading text.
    pub title: String,
    /// Raw body text.
    pub content: String,
    /// Machine-generated summary.
    pub summary: String,
    /// First page the node's content appeared on, when known.
    pub page_index: Option<usize>,
}

impl DocumentNode {
    /// Create a document root for the given hash.
    pub fn root(doc_hash: &str) -> Self {
        Self {
            ref_id: doc_hash.to_string(),
            level: 0,
            ..Self::default()
        }
    }

    /// Flatten the tree into `ref_id → record` entries, depth-first.
    ///
    /// A duplicate `ref_id` within the tree overwrites the earlier entry.
    pub fn index_records(&self) -> BTreeMap<String, NodeRecord> {
        let mut records = BTreeMap::new();
        self.collect_records(&mut records);
        records
    }

    fn collect_records(&self, records: &mut BTreeMap<String, NodeRecord>) {
        records.insert(
            self.ref_id.clone(),
            NodeRecord {
                ref_id: self.ref_id.clone(),
                parent_id: self.parent_id.clone(),
                title: self.title.clone(),
                content: self.content.clone(),
                summary: self.summary.clone(),
                page_index: self.page_index,
            },
        );
        for child in &self.children {
            child.collect_records(records);
        }
    }

    /// Render the prompt-friendly compact encoding of the tree.
    ///
    /// One `ref_id|title|summary[|p<page>]` tuple per node, depth-first in
    /// document order, indented two spaces per depth. Raw content and parent
    /// back-references are deliberately omitted to keep the retrieval prompt
    /// small.
    pub fn compact_encoding(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out, 0);
        out
    }

    fn encode_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&tuple_field(&self.ref_id));
        out.push('|');
        out.push_str(&tuple_field(&self.title));
        out.push('|');
        out.push_str(&tuple_field(&self.summary));
        if let Some(page) = self.page_index {
            out.push_str(&format!("|p{page}"));
        }
        out.push('\n');
        for child in &self.children {
            child.encode_into(out, depth + 1);
        }
    }
}

/// Keep tuple lines self-contained: field text must not introduce separators
/// or line breaks of its own.
fn tuple_field(text: &str) -> String {
    text.replace(['\n', '\r'], " ").replace('|', "/")
}
