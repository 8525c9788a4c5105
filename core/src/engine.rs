use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::{fs, thread};

use anyhow::{Context, Result};
use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::EngineOptions;
use crate::index::{sort_by_score, Indexer};
use crate::persist::{self, StorageShard};
use crate::tokenizer::{DefaultTokenizer, Tokenizer};
use crate::{DocId, DocumentData, DocumentIndex, ScoredDoc, SearchOptions};

/// Request consumed by the tokenization worker pool.
enum TokenizerRequest {
    Document { doc_id: DocId, data: DocumentData, force_update: bool },
    /// Broadcast a forced cache flush to every shard.
    Flush,
}

/// Request consumed by a shard's batching worker.
enum IndexRequest {
    Document { document: DocumentIndex, force_update: bool },
    /// Flush the shard's staging cache regardless of fill level.
    Flush,
}

struct StoreRequest {
    doc_id: DocId,
    data: DocumentData,
}

/// Pipeline progress counters with a condvar so the flush barrier can block
/// instead of spinning. Owned by the engine instance, so multiple engines
/// coexist in one process.
#[derive(Default)]
struct Counts {
    indexing_requests: u64,
    documents_indexed: u64,
    documents_stored: u64,
    flush_requests: u64,
    flushes_applied: u64,
    tokens_indexed: u64,
}

#[derive(Default)]
struct Progress {
    counts: Mutex<Counts>,
    converged: Condvar,
}

impl Progress {
    fn update(&self, apply: impl FnOnce(&mut Counts)) {
        let mut counts = self.counts.lock();
        apply(&mut counts);
        self.converged.notify_all();
    }

    fn wait_until(&self, reached: impl Fn(&Counts) -> bool) {
        let mut counts = self.counts.lock();
        while !reached(&counts) {
            self.converged.wait(&mut counts);
        }
    }

    fn snapshot(&self) -> (u64, u64, u64, u64, u64, u64) {
        let c = self.counts.lock();
        (
            c.indexing_requests,
            c.documents_indexed,
            c.documents_stored,
            c.flush_requests,
            c.flushes_applied,
            c.tokens_indexed,
        )
    }
}

/// Counter snapshot for host-side introspection.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub indexing_requests: u64,
    pub documents_indexed: u64,
    pub documents_stored: u64,
    pub flush_requests: u64,
    pub flushes_applied: u64,
    pub tokens_indexed: u64,
    /// Documents merged per shard; sums to an approximate total.
    pub shard_documents: Vec<u64>,
}

/// The sharded engine: owns N independent index shards, the tokenization
/// worker pool, one batching worker per shard, and the flush barrier.
///
/// All methods take `&self`; the engine is meant to be shared across threads
/// (e.g. behind an [`Arc`]).
pub struct Engine {
    options: EngineOptions,
    indexers: Vec<Arc<Indexer>>,
    tokenizer: Arc<dyn Tokenizer>,
    progress: Arc<Progress>,
    tokenizer_tx: Option<SyncSender<TokenizerRequest>>,
    store_txs: Vec<SyncSender<StoreRequest>>,
    workers: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Builds the shards, starts the worker pipeline and, when storage is
    /// configured, replays every stored document through the normal
    /// submission path before returning, so a recovered engine answers
    /// queries immediately.
    pub fn new(options: EngineOptions) -> Result<Self> {
        let options = options.normalized();
        let tokenizer: Arc<dyn Tokenizer> =
            options.tokenizer.clone().unwrap_or_else(|| Arc::new(DefaultTokenizer));

        let indexers: Vec<Arc<Indexer>> =
            (0..options.num_shards).map(|_| Arc::new(Indexer::new(options.indexer))).collect();
        let progress = Arc::new(Progress::default());
        let mut workers = Vec::new();

        // One bounded channel per shard, drained by that shard's worker.
        let mut shard_txs = Vec::with_capacity(options.num_shards);
        for indexer in &indexers {
            let (tx, rx) = mpsc::sync_channel::<IndexRequest>(options.indexer_buffer_length);
            shard_txs.push(tx);
            let indexer = Arc::clone(indexer);
            let progress = Arc::clone(&progress);
            workers.push(thread::spawn(move || shard_worker(rx, indexer, progress)));
        }

        // The tokenization pool shares a single bounded queue; a full queue
        // blocks submitters, which is the intended backpressure.
        let (tokenizer_tx, tokenizer_rx) =
            mpsc::sync_channel::<TokenizerRequest>(options.num_tokenizer_workers);
        let tokenizer_rx = Arc::new(Mutex::new(tokenizer_rx));
        for _ in 0..options.num_tokenizer_workers {
            let rx = Arc::clone(&tokenizer_rx);
            let txs = shard_txs.clone();
            let tokenizer = Arc::clone(&tokenizer);
            let progress = Arc::clone(&progress);
            workers.push(thread::spawn(move || tokenizer_worker(rx, txs, tokenizer, progress)));
        }
        drop(shard_txs);

        let mut engine = Self {
            options,
            indexers,
            tokenizer,
            progress,
            tokenizer_tx: Some(tokenizer_tx),
            store_txs: Vec::new(),
            workers,
        };

        if let Some(storage) = engine.options.storage.clone() {
            fs::create_dir_all(&storage.folder)
                .with_context(|| format!("creating storage folder {}", storage.folder.display()))?;
            let shards = persist::open_shards(&storage.folder, storage.shards)?;
            engine.replay_storage(&shards)?;
            for shard in shards {
                let (tx, rx) = mpsc::sync_channel::<StoreRequest>(engine.options.indexer_buffer_length);
                engine.store_txs.push(tx);
                let progress = Arc::clone(&engine.progress);
                engine.workers.push(thread::spawn(move || store_worker(rx, shard, progress)));
            }
            // Recovered submissions may still sit in shard caches; the
            // barrier forces them into the tables before we return.
            engine.flush_index();
        }

        Ok(engine)
    }

    /// Re-submits every stored document through the tokenization pipeline.
    /// Replayed records are counted as already stored, keeping the flush
    /// barrier's stored-count equation convergent.
    fn replay_storage(&self, shards: &[StorageShard]) -> Result<()> {
        let mut recovered = 0u64;
        for shard in shards {
            shard.for_each(|doc_id, data| {
                self.progress.update(|c| {
                    c.indexing_requests += 1;
                    c.documents_stored += 1;
                });
                self.send_to_tokenizer(TokenizerRequest::Document {
                    doc_id,
                    data,
                    force_update: false,
                });
                recovered += 1;
            })?;
        }
        if recovered > 0 {
            info!(documents = recovered, "recovered documents from storage");
        }
        Ok(())
    }

    /// Submits a document for indexing. Fire-and-forget: the call returns as
    /// soon as the request is queued (blocking only when the tokenization
    /// queue is full) and completion is observed via [`Engine::flush_index`].
    ///
    /// `force_update` flushes the target shard's cache as soon as the
    /// document reaches it instead of waiting for the cache to fill.
    pub fn index_document(&self, doc_id: DocId, data: DocumentData, force_update: bool) {
        if doc_id == 0 {
            warn!("doc id 0 is reserved, dropping submission");
            return;
        }
        self.progress.update(|c| {
            c.indexing_requests += 1;
            if force_update {
                c.flush_requests += 1;
            }
        });
        self.send_to_tokenizer(TokenizerRequest::Document {
            doc_id,
            data: data.clone(),
            force_update,
        });
        if !self.store_txs.is_empty() {
            let slot = shard_for(doc_id, self.store_txs.len());
            self.store_txs[slot]
                .send(StoreRequest { doc_id, data })
                .expect("document store worker exited");
        }
    }

    /// Blocks until every accepted submission has been applied.
    ///
    /// Two phases: first wait for the pipeline to drain (every request
    /// tokenized, routed, cached and, with storage enabled, written), then
    /// broadcast one forced flush and wait until every shard has applied it.
    /// The second phase is what pushes documents still sitting below the
    /// cache threshold into the index tables.
    pub fn flush_index(&self) {
        let persistent = !self.store_txs.is_empty();
        self.progress.wait_until(|c| {
            c.indexing_requests == c.documents_indexed
                && (!persistent || c.indexing_requests == c.documents_stored)
        });

        self.progress.update(|c| c.flush_requests += 1);
        self.send_to_tokenizer(TokenizerRequest::Flush);

        let num_shards = self.options.num_shards as u64;
        self.progress.wait_until(|c| c.flush_requests * num_shards == c.flushes_applied);
    }

    /// Conjunctive keyword lookup across all shards. Shards hold disjoint
    /// documents, so the merge is a plain union re-sorted by score.
    pub fn lookup<S: AsRef<str>>(&self, words: &[S]) -> Vec<ScoredDoc> {
        let mut docs = Vec::new();
        for indexer in &self.indexers {
            docs.extend(indexer.lookup(words));
        }
        sort_by_score(&mut docs);
        docs
    }

    /// Tokenizes `query` with the engine's tokenizer, looks the words up on
    /// every shard, and shapes the output per `options`.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<ScoredDoc> {
        let words: Vec<String> =
            self.tokenizer.tokenize(query).keywords.into_iter().map(|k| k.word).collect();
        if words.is_empty() {
            return Vec::new();
        }
        let mut docs = self.lookup(&words);
        if options.reverse_order {
            docs.reverse();
        }
        if options.output_offset > 0 {
            docs.drain(..options.output_offset.min(docs.len()));
        }
        if options.max_outputs > 0 {
            docs.truncate(options.max_outputs);
        }
        docs
    }

    /// Snapshot of the pipeline counters and per-shard document counts.
    pub fn stats(&self) -> EngineStats {
        let (
            indexing_requests,
            documents_indexed,
            documents_stored,
            flush_requests,
            flushes_applied,
            tokens_indexed,
        ) = self.progress.snapshot();
        EngineStats {
            indexing_requests,
            documents_indexed,
            documents_stored,
            flush_requests,
            flushes_applied,
            tokens_indexed,
            shard_documents: self.indexers.iter().map(|i| i.num_documents()).collect(),
        }
    }

    pub fn num_shards(&self) -> usize {
        self.options.num_shards
    }

    /// Flushes outstanding work, then tears the pipeline down and joins all
    /// workers. Dropping an engine without calling this skips the final
    /// flush.
    pub fn close(mut self) {
        self.flush_index();
        self.shutdown();
    }

    fn send_to_tokenizer(&self, request: TokenizerRequest) {
        self.tokenizer_tx
            .as_ref()
            .expect("engine already shut down")
            .send(request)
            .expect("tokenization workers exited");
    }

    fn shutdown(&mut self) {
        // Dropping the senders cascades: the tokenization pool exits and
        // releases its shard senders, which in turn stops the shard workers.
        self.tokenizer_tx = None;
        self.store_txs.clear();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Deterministic shard routing. Stable across restarts, which recovery
/// relies on: a replayed document must land on the shard it was originally
/// indexed into.
pub fn shard_for(doc_id: DocId, num_shards: usize) -> usize {
    (xxh3_64(&doc_id.to_le_bytes()) % num_shards as u64) as usize
}

fn tokenizer_worker(
    rx: Arc<Mutex<Receiver<TokenizerRequest>>>,
    shard_txs: Vec<SyncSender<IndexRequest>>,
    tokenizer: Arc<dyn Tokenizer>,
    progress: Arc<Progress>,
) {
    loop {
        let request = { rx.lock().recv() };
        match request {
            Ok(TokenizerRequest::Document { doc_id, data, force_update }) => {
                let tokenized = if data.content.is_empty() {
                    warn!(doc_id, "empty document content, indexing no keywords");
                    Default::default()
                } else {
                    tokenizer.tokenize(&data.content)
                };
                let document = DocumentIndex {
                    doc_id,
                    token_length: tokenized.token_length,
                    keywords: tokenized.keywords,
                };
                let shard = shard_for(doc_id, shard_txs.len());
                if shard_txs[shard]
                    .send(IndexRequest::Document { document, force_update })
                    .is_err()
                {
                    return;
                }
                if force_update {
                    // Every shard must observe a force-updating request for
                    // the barrier count to converge.
                    for (i, tx) in shard_txs.iter().enumerate() {
                        if i != shard && tx.send(IndexRequest::Flush).is_err() {
                            return;
                        }
                    }
                }
            }
            Ok(TokenizerRequest::Flush) => {
                for tx in &shard_txs {
                    if tx.send(IndexRequest::Flush).is_err() {
                        return;
                    }
                }
            }
            Err(_) => return,
        }
    }
}

fn shard_worker(rx: Receiver<IndexRequest>, indexer: Arc<Indexer>, progress: Arc<Progress>) {
    while let Ok(request) = rx.recv() {
        match request {
            IndexRequest::Document { document, force_update } => {
                let tokens = document.keywords.len() as u64;
                indexer.add_to_cache(Some(document), force_update);
                progress.update(|c| {
                    c.documents_indexed += 1;
                    c.tokens_indexed += tokens;
                    if force_update {
                        c.flushes_applied += 1;
                    }
                });
            }
            IndexRequest::Flush => {
                indexer.add_to_cache(None, true);
                progress.update(|c| c.flushes_applied += 1);
            }
        }
    }
}

fn store_worker(rx: Receiver<StoreRequest>, shard: StorageShard, progress: Arc<Progress>) {
    while let Ok(request) = rx.recv() {
        match shard.put(request.doc_id, &request.data) {
            Ok(()) => progress.update(|c| c.documents_stored += 1),
            Err(error) => {
                // The barrier compares stored against accepted counts, so a
                // failed write still advances the counter; the document
                // simply will not survive a restart.
                warn!(doc_id = request.doc_id, %error, "failed to store document");
                progress.update(|c| c.documents_stored += 1);
            }
        }
    }
    if let Err(error) = shard.flush() {
        warn!(%error, "failed to flush document store shard");
    }
}
