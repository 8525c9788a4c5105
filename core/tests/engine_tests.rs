use std::sync::Arc;
use std::thread;

use core::tokenizer::{TokenizedText, Tokenizer};
use core::{DocumentData, Engine, EngineOptions, IndexerOptions, Keyword, SearchOptions, StorageOptions};

/// Parses content of the form "word:weight word:weight ..." into keywords,
/// so tests control the exact weighted keyword sets the index receives.
struct FixtureTokenizer;

impl Tokenizer for FixtureTokenizer {
    fn tokenize(&self, text: &str) -> TokenizedText {
        let keywords: Vec<Keyword> = text
            .split_whitespace()
            .map(|pair| {
                let (word, weight) = pair.split_once(':').unwrap_or((pair, "1.0"));
                Keyword { word: word.to_string(), weight: weight.parse().unwrap() }
            })
            .collect();
        TokenizedText { token_length: keywords.len() as u32, keywords }
    }
}

fn fixture_engine(options: EngineOptions) -> Engine {
    let options = EngineOptions { tokenizer: Some(Arc::new(FixtureTokenizer)), ..options };
    Engine::new(options).unwrap()
}

#[test]
fn worked_example_scores_and_order() {
    // One shard: the existence gate is shard-local, and this example needs
    // both documents behind the same gate.
    let engine = fixture_engine(EngineOptions { num_shards: 1, ..Default::default() });
    engine.index_document(1, DocumentData::from_content("alpha:1.0"), false);
    engine.index_document(2, DocumentData::from_content("alpha:0.4 beta:1.0"), false);
    engine.flush_index();

    let hits = engine.lookup(&["alpha"]);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].doc_id, 1);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(hits[1].doc_id, 2);
    assert!((hits[1].score - 0.4).abs() < 1e-6);

    // "beta" exists in the table, so the existence gate passes and doc 1
    // scores with only its alpha weight.
    let hits = engine.lookup(&["alpha", "beta"]);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].doc_id, 2);
    assert!((hits[0].score - 1.4).abs() < 1e-6);
    assert_eq!(hits[1].doc_id, 1);
    assert!((hits[1].score - 1.0).abs() < 1e-6);

    assert!(engine.lookup(&["alpha", "gamma"]).is_empty());
    engine.close();
}

#[test]
fn flush_converges_under_concurrent_submissions() {
    let engine = Arc::new(fixture_engine(EngineOptions { num_shards: 4, ..Default::default() }));
    let total = 64u64;

    let mut handles = Vec::new();
    for t in 0..4u64 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..total / 4 {
                let doc_id = 1 + t * (total / 4) + i;
                let content = format!("common:1.0 unique{doc_id}:0.5");
                engine.index_document(doc_id, DocumentData::from_content(content), false);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    engine.flush_index();

    let hits = engine.lookup(&["common"]);
    assert_eq!(hits.len(), total as usize);

    let stats = engine.stats();
    assert_eq!(stats.indexing_requests, total);
    assert_eq!(stats.documents_indexed, total);
    assert_eq!(stats.shard_documents.iter().sum::<u64>(), total);
}

#[test]
fn duplicate_submission_keeps_later_content() {
    // One tokenization worker keeps submission order intact through the
    // pipeline, so both records land in the same cache window in order.
    let engine = fixture_engine(EngineOptions { num_tokenizer_workers: 1, ..Default::default() });
    engine.index_document(7, DocumentData::from_content("stale:1.0"), false);
    engine.index_document(7, DocumentData::from_content("fresh:1.0"), false);
    engine.flush_index();

    assert!(engine.lookup(&["stale"]).is_empty());
    let hits = engine.lookup(&["fresh"]);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id, 7);
    engine.close();
}

#[test]
fn force_updated_submissions_do_not_wedge_the_barrier() {
    let engine = fixture_engine(EngineOptions { num_shards: 3, ..Default::default() });
    for doc_id in 1..=5u64 {
        engine.index_document(doc_id, DocumentData::from_content("hot:1.0"), true);
    }
    engine.flush_index();
    assert_eq!(engine.lookup(&["hot"]).len(), 5);
    engine.close();
}

#[test]
fn empty_content_and_reserved_id_are_dropped_without_deadlock() {
    let engine = fixture_engine(EngineOptions::default());
    engine.index_document(0, DocumentData::from_content("ignored:1.0"), false);
    engine.index_document(3, DocumentData::from_content(""), false);
    engine.flush_index();

    let stats = engine.stats();
    // The reserved id never entered the pipeline; the empty document did,
    // contributing zero keywords.
    assert_eq!(stats.indexing_requests, 1);
    assert_eq!(stats.documents_indexed, 1);
    assert_eq!(stats.tokens_indexed, 0);
    engine.close();
}

#[test]
fn search_applies_rank_options() {
    let engine = fixture_engine(EngineOptions::default());
    engine.index_document(1, DocumentData::from_content("ore:0.9"), false);
    engine.index_document(2, DocumentData::from_content("ore:0.7"), false);
    engine.index_document(3, DocumentData::from_content("ore:0.5"), false);
    engine.flush_index();

    let hits = engine.search("ore", &SearchOptions::default());
    assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![1, 2, 3]);

    let hits = engine.search(
        "ore",
        &SearchOptions { output_offset: 1, max_outputs: 1, ..Default::default() },
    );
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id, 2);

    let hits = engine.search("ore", &SearchOptions { reverse_order: true, ..Default::default() });
    assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![3, 2, 1]);

    assert!(engine.search("", &SearchOptions::default()).is_empty());
    engine.close();
}

#[test]
fn small_cache_flushes_mid_stream() {
    let engine = fixture_engine(EngineOptions {
        num_shards: 1,
        indexer: IndexerOptions { doc_cache_size: 2 },
        ..Default::default()
    });
    for doc_id in 1..=5u64 {
        engine.index_document(doc_id, DocumentData::from_content("grain:1.0"), false);
    }
    engine.flush_index();
    assert_eq!(engine.lookup(&["grain"]).len(), 5);
    engine.close();
}

#[test]
fn storage_recovery_restores_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageOptions { folder: dir.path().to_path_buf(), shards: 2 };

    let engine = fixture_engine(EngineOptions {
        storage: Some(storage.clone()),
        ..Default::default()
    });
    for doc_id in 1..=10u64 {
        let content = format!("stored:1.0 tag{doc_id}:0.5");
        engine.index_document(doc_id, DocumentData::from_content(content), false);
    }
    engine.flush_index();
    assert_eq!(engine.lookup(&["stored"]).len(), 10);
    engine.close();

    // A fresh engine over the same folder replays the store on startup and
    // answers queries without any re-submission.
    let recovered = fixture_engine(EngineOptions {
        storage: Some(storage),
        ..Default::default()
    });
    let hits = recovered.lookup(&["stored"]);
    assert_eq!(hits.len(), 10);
    let stats = recovered.stats();
    assert_eq!(stats.indexing_requests, 10);
    assert_eq!(stats.documents_stored, 10);
    recovered.close();
}
