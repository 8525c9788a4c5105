pub mod config;
pub mod engine;
pub mod index;
pub mod persist;
pub mod tokenizer;

use serde::{Deserialize, Serialize};

pub use config::{EngineOptions, IndexerOptions, StorageOptions};
pub use engine::{Engine, EngineStats};
pub use index::Indexer;
pub use tokenizer::{DefaultTokenizer, TokenizedText, Tokenizer};

/// Document identifier. `0` is reserved and never names a real document.
pub type DocId = u64;

/// One keyword extracted from a document, with its weight within that
/// document (weights are typically normalized so the document maximum is 1.0).
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub word: String,
    pub weight: f32,
}

/// A tokenized document ready to be merged into a shard's inverted index.
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    pub doc_id: DocId,
    /// Total token count of the document, kept for length stats.
    pub token_length: u32,
    /// One entry per distinct keyword.
    pub keywords: Vec<Keyword>,
}

/// Raw submission payload. `content` feeds the tokenizer; `title` is carried
/// metadata, stored alongside the content when persistence is enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentData {
    pub title: Option<String>,
    pub content: String,
}

impl DocumentData {
    pub fn from_content<S: Into<String>>(content: S) -> Self {
        Self { title: None, content: content.into() }
    }
}

/// A query hit: document id and its aggregate keyword weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f32,
}

/// Output shaping for [`Engine::search`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Sort ascending by score instead of the default descending.
    pub reverse_order: bool,
    /// Number of leading results to skip.
    pub output_offset: usize,
    /// Maximum number of results returned; 0 means unlimited.
    pub max_outputs: usize,
}
