use std::collections::HashMap;
use std::mem;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::config::IndexerOptions;
use crate::{DocId, DocumentIndex, ScoredDoc};

/// One keyword's postings: document ids in strictly ascending order with the
/// index-aligned weight of the keyword in each document.
#[derive(Debug, Default)]
pub struct PostingsRow {
    doc_ids: Vec<DocId>,
    weights: Vec<f32>,
}

impl PostingsRow {
    fn single(doc_id: DocId, weight: f32) -> Self {
        Self { doc_ids: vec![doc_id], weights: vec![weight] }
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, f32)> + '_ {
        self.doc_ids.iter().copied().zip(self.weights.iter().copied())
    }

    /// Finds `doc_id` in the row, searching no earlier than `start`.
    ///
    /// Returns the position of the id when present (`found == true`), or the
    /// position it must be inserted at to keep the row ascending. Batches are
    /// merged in ascending doc-id order, so passing the previous insertion
    /// position as `start` keeps each lookup near the tail.
    fn locate(&self, doc_id: DocId, start: usize) -> (usize, bool) {
        if start >= self.doc_ids.len() {
            return (self.doc_ids.len(), false);
        }
        let mut lo = start;
        let mut hi = self.doc_ids.len() - 1;
        if doc_id < self.doc_ids[lo] {
            return (lo, false);
        } else if doc_id == self.doc_ids[lo] {
            return (lo, true);
        }
        if doc_id > self.doc_ids[hi] {
            return (hi + 1, false);
        } else if doc_id == self.doc_ids[hi] {
            return (hi, true);
        }

        while hi - lo > 1 {
            let middle = (lo + hi) / 2;
            if doc_id == self.doc_ids[middle] {
                return (middle, true);
            } else if doc_id > self.doc_ids[middle] {
                lo = middle;
            } else {
                hi = middle;
            }
        }
        (hi, false)
    }

    fn insert_at(&mut self, position: usize, doc_id: DocId, weight: f32) {
        self.doc_ids.insert(position, doc_id);
        self.weights.insert(position, weight);
    }
}

#[derive(Default)]
struct Table {
    rows: HashMap<String, PostingsRow>,
    /// Keyword count per indexed document.
    doc_token_lengths: HashMap<DocId, u32>,
    /// Approximate number of documents merged into this shard.
    num_documents: u64,
    total_token_length: u64,
}

struct DocCache {
    staged: Vec<DocumentIndex>,
}

/// One shard of the inverted index: the keyword table plus the staging cache
/// that batches incoming documents before they are merged.
///
/// The table and the cache are guarded by separate locks so that staging new
/// documents is never blocked by an in-progress merge.
pub struct Indexer {
    table: RwLock<Table>,
    cache: Mutex<DocCache>,
    options: IndexerOptions,
}

impl Indexer {
    pub fn new(options: IndexerOptions) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            cache: Mutex::new(DocCache { staged: Vec::new() }),
            options: options.normalized(),
        }
    }

    /// Stages `document` for merging. Once the cache holds `doc_cache_size`
    /// documents, or when `force_update` is set, the staged batch is sorted
    /// by ascending doc id (stable, so a doc id submitted twice keeps its
    /// later entry) and merged into the table. `None` with `force_update`
    /// flushes whatever is currently staged.
    ///
    /// The cache lock is released before the sort and merge, so other
    /// producers keep staging into the emptied cache while the extracted
    /// batch is processed.
    pub fn add_to_cache(&self, document: Option<DocumentIndex>, force_update: bool) {
        let extracted = {
            let mut cache = self.cache.lock();
            if let Some(document) = document {
                cache.staged.push(document);
            }
            if cache.staged.len() >= self.options.doc_cache_size || force_update {
                Some(mem::take(&mut cache.staged))
            } else {
                None
            }
        };
        if let Some(mut batch) = extracted {
            batch.sort_by_key(|document| document.doc_id);
            self.merge_batch(batch);
        }
    }

    /// Merges a batch of documents, already sorted ascending by doc id, into
    /// the keyword table. Adjacent entries sharing a doc id are deduplicated
    /// keeping only the last one. An empty batch is a no-op.
    pub fn merge_batch(&self, documents: Vec<DocumentIndex>) {
        if documents.is_empty() {
            return;
        }
        let mut table = self.table.write();
        let table = &mut *table;
        // Last insertion position per keyword, carried across the whole
        // batch: ascending doc ids mean each keyword's insertion point only
        // moves right, so later lookups skip the already-scanned prefix.
        let mut cursors: HashMap<&str, usize> = HashMap::new();

        for (i, document) in documents.iter().enumerate() {
            if i + 1 < documents.len() && document.doc_id == documents[i + 1].doc_id {
                debug!(doc_id = document.doc_id, "duplicate document in batch, keeping last");
                continue;
            }

            if document.token_length != 0 {
                table.doc_token_lengths.insert(document.doc_id, document.token_length);
                table.total_token_length += document.token_length as u64;
            }

            for keyword in &document.keywords {
                match table.rows.get_mut(&keyword.word) {
                    None => {
                        table
                            .rows
                            .insert(keyword.word.clone(), PostingsRow::single(document.doc_id, keyword.weight));
                    }
                    Some(row) => {
                        let start = cursors.get(keyword.word.as_str()).copied().unwrap_or(0);
                        let (position, found) = row.locate(document.doc_id, start);
                        cursors.insert(&keyword.word, position);
                        if !found {
                            row.insert_at(position, document.doc_id, keyword.weight);
                        }
                    }
                }
            }
            table.num_documents += 1;
        }
    }

    /// Conjunctive lookup: every queried word must exist in the table, or the
    /// result is empty. Once that gate passes, scores are the summed weights
    /// over the union of the queried words' postings.
    ///
    /// Note this is deliberately not a strict postings intersection: a
    /// document containing only some of the words still appears (with the
    /// weights it has) as long as every word exists somewhere in the shard.
    pub fn lookup<S: AsRef<str>>(&self, words: &[S]) -> Vec<ScoredDoc> {
        let table = self.table.read();
        if table.num_documents == 0 {
            return Vec::new();
        }

        let mut scores: HashMap<DocId, f32> = HashMap::new();
        for word in words {
            let row = match table.rows.get(word.as_ref()) {
                Some(row) => row,
                None => return Vec::new(),
            };
            for (doc_id, weight) in row.iter() {
                *scores.entry(doc_id).or_insert(0.0) += weight;
            }
        }

        let mut docs: Vec<ScoredDoc> =
            scores.into_iter().map(|(doc_id, score)| ScoredDoc { doc_id, score }).collect();
        sort_by_score(&mut docs);
        docs
    }

    /// Number of documents merged into this shard so far. Approximate: the
    /// count only moves when batches are flushed out of the staging cache.
    pub fn num_documents(&self) -> u64 {
        self.table.read().num_documents
    }

    /// Sum of token lengths across all indexed documents.
    pub fn total_token_length(&self) -> u64 {
        self.table.read().total_token_length
    }

    /// Token length recorded for `doc_id`, if it has been merged.
    pub fn doc_token_length(&self, doc_id: DocId) -> Option<u32> {
        self.table.read().doc_token_lengths.get(&doc_id).copied()
    }
}

/// Score descending, ties broken by ascending doc id so results are
/// deterministic.
pub(crate) fn sort_by_score(docs: &mut [ScoredDoc]) {
    docs.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
}
