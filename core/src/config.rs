use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crate::tokenizer::Tokenizer;

/// Documents staged per shard before a cache flush into the index table.
const DEFAULT_DOC_CACHE_SIZE: usize = 300_000;
const DEFAULT_NUM_SHARDS: usize = 2;
const DEFAULT_INDEXER_BUFFER_LENGTH: usize = 64;
const DEFAULT_STORAGE_SHARDS: usize = 8;

/// Options for one shard-local [`crate::Indexer`].
///
/// Zero-valued fields are treated as unset and replaced with defaults by
/// [`IndexerOptions::normalized`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexerOptions {
    /// Staging-cache capacity: how many documents accumulate before being
    /// sorted and merged as one batch.
    pub doc_cache_size: usize,
}

impl IndexerOptions {
    pub fn normalized(mut self) -> Self {
        if self.doc_cache_size == 0 {
            self.doc_cache_size = DEFAULT_DOC_CACHE_SIZE;
        }
        self
    }
}

/// On-disk document store configuration.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Directory holding the store shards; created if missing.
    pub folder: PathBuf,
    /// Number of store shards, fixed for the lifetime of the dataset.
    pub shards: usize,
}

impl StorageOptions {
    pub fn new<P: Into<PathBuf>>(folder: P) -> Self {
        Self { folder: folder.into(), shards: 0 }
    }

    fn normalized(mut self) -> Self {
        if self.shards == 0 {
            self.shards = DEFAULT_STORAGE_SHARDS;
        }
        self
    }
}

/// Engine construction options. Zero-valued numeric fields are unset and
/// take fixed positive defaults, so queue and cache sizes are always valid.
#[derive(Clone, Default)]
pub struct EngineOptions {
    /// Number of index shards.
    pub num_shards: usize,
    /// Size of the tokenization worker pool.
    pub num_tokenizer_workers: usize,
    /// Bound of each shard's request channel.
    pub indexer_buffer_length: usize,
    /// Per-shard indexer options.
    pub indexer: IndexerOptions,
    /// Optional persistent document store; recovery replays it on startup.
    pub storage: Option<StorageOptions>,
    /// Tokenizer used by the pipeline; `None` selects the built-in one.
    pub tokenizer: Option<Arc<dyn Tokenizer>>,
}

impl EngineOptions {
    pub(crate) fn normalized(mut self) -> Self {
        if self.num_shards == 0 {
            self.num_shards = DEFAULT_NUM_SHARDS;
        }
        if self.num_tokenizer_workers == 0 {
            self.num_tokenizer_workers =
                thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        }
        if self.indexer_buffer_length == 0 {
            self.indexer_buffer_length = DEFAULT_INDEXER_BUFFER_LENGTH;
        }
        self.indexer = self.indexer.normalized();
        self.storage = self.storage.map(StorageOptions::normalized);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fields_take_positive_defaults() {
        let opts = EngineOptions::default().normalized();
        assert!(opts.num_shards > 0);
        assert!(opts.num_tokenizer_workers > 0);
        assert!(opts.indexer_buffer_length > 0);
        assert!(opts.indexer.doc_cache_size > 0);
    }

    #[test]
    fn explicit_values_survive_normalization() {
        let opts = EngineOptions {
            num_shards: 4,
            indexer: IndexerOptions { doc_cache_size: 10 },
            ..Default::default()
        }
        .normalized();
        assert_eq!(opts.num_shards, 4);
        assert_eq!(opts.indexer.doc_cache_size, 10);
    }
}
