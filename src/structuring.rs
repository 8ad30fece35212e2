//! Tree construction from a structurer's item stream.
//!
//! Converting a raw source (file or URL) into typed items is an external
//! concern behind [`DocumentStructurer`]; this module owns what the engine
//! relies on afterwards: the stack-based sectioning rule that folds the item
//! stream into one [`DocumentNode`] tree, and the corpus-unique document hash.

use crate::model::DocumentNode;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised by document structurers.
#[derive(Debug, Error)]
pub enum StructuringError {
    /// The source could not be read or fetched.
    #[error("Failed to read source '{uri}': {reason}")]
    SourceUnavailable {
        /// Source identifier handed to the structurer.
        uri: String,
        /// Underlying failure description.
        reason: String,
    },
    /// The source was readable but not a supported document format.
    #[error("Unsupported document format for '{0}'")]
    UnsupportedFormat(String),
}

/// One typed item emitted by a structurer, in document order.
#[derive(Debug, Clone)]
pub struct DocumentItem {
    /// Structurer-assigned per-item identifier, unique within the document.
    pub local_id: String,
    /// Page the item appeared on, when the source has pages.
    pub page: Option<usize>,
    /// Structural kind and payload.
    pub kind: ItemKind,
}

/// Structural kinds the sectioning rule distinguishes.
#[derive(Debug, Clone)]
pub enum ItemKind {
    /// Section heading opening a new node at the given depth (>= 1).
    Heading {
        /// Heading depth; the root sits at depth 0.
        level: usize,
        /// Heading text.
        text: String,
    },
    /// Plain prose appended to the current section.
    Paragraph {
        /// Paragraph text.
        text: String,
    },
    /// Table rendered by the structurer, kept verbatim.
    Table {
        /// Markdown rendering of the table.
        markdown: String,
    },
    /// Code or formula block, kept verbatim inside a fence.
    Code {
        /// Raw block text.
        text: String,
    },
}

/// Interface implemented by document structurers.
#[async_trait]
pub trait DocumentStructurer: Send + Sync {
    /// Produce the document-order item stream for a source identifier.
    async fn structure(&self, source: &str) -> Result<Vec<DocumentItem>, StructuringError>;
}

/// Derive the corpus-unique document hash for a source identifier.
///
/// First 8 hex characters of the SHA-256 digest of the identifier itself, so
/// re-ingesting the same source lands on the same `doc_id`.
pub fn doc_hash(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// Fold an item stream into a document tree rooted at `doc_hash`.
///
/// Headings maintain a stack of open nodes seeded with the root: each heading
/// pops until the stack top has a strictly smaller level, then pushes a new
/// child there with `ref_id = <doc_hash>/<local_id>`. Every other item appends
/// to the content of the current stack top and backfills its `page_index` when
/// unset. Two items sharing a `local_id` collide on `ref_id`; the later one
/// wins in the flat index.
pub fn build_tree(doc_hash: &str, items: Vec<DocumentItem>) -> DocumentNode {
    let mut root = DocumentNode::root(doc_hash);
    // Path of child indexes from the root to the currently open node. The
    // borrow checker rules out a stack of `&mut DocumentNode`, so the stack
    // holds positions and `node_at_path` re-walks the spine on demand.
    let mut path: Vec<usize> = Vec::new();

    for item in items {
        match item.kind {
            ItemKind::Heading { level, text } => {
                while !path.is_empty() && level_at_path(&root, &path) >= level {
                    path.pop();
                }
                let parent = node_at_path(&mut root, &path);
                let node = DocumentNode {
                    ref_id: format!("{doc_hash}/{}", item.local_id),
                    parent_id: parent.ref_id.clone(),
                    level,
                    title: text,
                    page_index: item.page,
                    ..DocumentNode::default()
                };
                parent.children.push(node);
                path.push(parent.children.len() - 1);
            }
            ItemKind::Paragraph { text } => {
                append_body(node_at_path(&mut root, &path), &format!("{text}\n"), item.page);
            }
            ItemKind::Table { markdown } => {
                append_body(
                    node_at_path(&mut root, &path),
                    &format!("\n{markdown}\n"),
                    item.page,
                );
            }
            ItemKind::Code { text } => {
                append_body(
                    node_at_path(&mut root, &path),
                    &format!("\n```\n{text}\n```\n"),
                    item.page,
                );
            }
        }
    }

    root
}

fn append_body(node: &mut DocumentNode, chunk: &str, page: Option<usize>) {
    node.content.push_str(chunk);
    if node.page_index.is_none() {
        node.page_index = page;
    }
}

fn node_at_path<'a>(root: &'a mut DocumentNode, path: &[usize]) -> &'a mut DocumentNode {
    let mut node = root;
    for &index in path {
        node = &mut node.children[index];
    }
    node
}

fn level_at_path(root: &DocumentNode, path: &[usize]) -> usize {
    let mut node = root;
    for &index in path {
        node = &node.children[index];
    }
    node.level
}
