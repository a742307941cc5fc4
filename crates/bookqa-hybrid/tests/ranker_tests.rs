mod common;

use std::collections::HashMap;
use std::sync::Arc;

use bookqa_core::error::Error;
use bookqa_core::nlp::Thesaurus;
use bookqa_core::types::ScoreVector;
use bookqa_embed::EmbeddingCache;
use bookqa_hybrid::ranker::{fuse, min_max_normalize, top_k_indices};
use bookqa_hybrid::{BookCorpus, HybridRanker};
use bookqa_vector::ExactBackend;

use common::{harness, harness_with, scenario, ScriptedEmbedder, VocabEmbedder};

fn ids(results: &[bookqa_hybrid::RankedChunk]) -> Vec<usize> {
    results.iter().map(|r| r.chunk.id).collect()
}

#[tokio::test]
async fn cat_query_prefers_the_cat_chunk() {
    let h = harness(Arc::new(VocabEmbedder::new()));
    let corpus = h.ingest(scenario()).await;
    let ranker = HybridRanker::new(corpus, h.store.clone(), h.service.clone(), h.expander.clone());

    let results = ranker.search("cat", 2).await.expect("search");
    assert_eq!(ids(&results), vec![0, 2]);
    assert!(results[0].scores.fused > results[1].scores.fused);
    for r in &results {
        assert!((0.0..=1.0).contains(&r.scores.fused));
    }

    let all = ranker.search("cat", 3).await.expect("search all");
    assert_eq!(all.last().map(|r| r.chunk.id), Some(1));
}

#[tokio::test]
async fn searching_does_not_add_query_vectors_to_the_cache() {
    let provider = Arc::new(VocabEmbedder::new());
    let h = harness(provider.clone());
    let corpus = h.ingest(scenario()).await;
    let ranker = HybridRanker::new(corpus, h.store.clone(), h.service.clone(), h.expander.clone());

    let query_text = h.expander.weighted_text(&h.expander.prepare("cat"));
    let calls = provider.calls();
    ranker.search("cat", 2).await.expect("search");
    ranker.search("cat", 2).await.expect("search again");
    assert_eq!(provider.calls(), calls + 2);
    assert!(h.service.cache().get(&EmbeddingCache::key_for(&query_text)).is_none());
}

#[tokio::test]
async fn weight_extremes_follow_a_single_signal() {
    let vectors: HashMap<String, Vec<f32>> = [
        ("cat cat cat", vec![0.0, 1.0]),
        ("cat dog", vec![1.0, 0.0]),
        ("dog bird", vec![0.5, 0.5]),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let parts: Vec<String> = ["cat cat cat", "cat dog", "dog bird"].iter().map(|s| s.to_string()).collect();
    let h = harness(Arc::new(ScriptedEmbedder { vectors, default: vec![1.0, 0.0] }));
    let corpus = h.ingest(parts).await;

    let lexical_only = HybridRanker::new(corpus.clone(), h.store.clone(), h.service.clone(), h.expander.clone())
        .with_embedding_weight(0.0)
        .expect("weight");
    assert_eq!(ids(&lexical_only.search("cat", 3).await.expect("search")), vec![0, 1, 2]);

    let semantic_only = HybridRanker::new(corpus, h.store.clone(), h.service.clone(), h.expander.clone())
        .with_embedding_weight(1.0)
        .expect("weight");
    assert_eq!(ids(&semantic_only.search("cat", 3).await.expect("search")), vec![1, 2, 0]);
}

#[tokio::test]
async fn rejects_weight_outside_unit_interval() {
    let h = harness(Arc::new(VocabEmbedder::new()));
    let corpus = Arc::new(BookCorpus::empty().expect("empty"));
    let err = HybridRanker::new(corpus, h.store.clone(), h.service.clone(), h.expander.clone())
        .with_embedding_weight(1.5)
        .err()
        .expect("invalid weight");
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn empty_corpus_and_zero_top_k_return_nothing() {
    let provider = Arc::new(VocabEmbedder::new());
    let h = harness(provider.clone());
    let empty = h.ingest(Vec::new()).await;
    assert!(empty.is_empty());
    let ranker = HybridRanker::new(empty, h.store.clone(), h.service.clone(), h.expander.clone());
    assert!(ranker.search("cat", 5).await.expect("search").is_empty());
    assert_eq!(provider.calls(), 0);

    let corpus = h.ingest(scenario()).await;
    let ranker = HybridRanker::new(corpus, h.store.clone(), h.service.clone(), h.expander.clone());
    assert!(ranker.search("cat", 0).await.expect("search").is_empty());
}

#[tokio::test]
async fn query_dimension_must_match_corpus() {
    let h = harness(Arc::new(VocabEmbedder::new()));
    let corpus = h.ingest(scenario()).await;

    let other = harness(Arc::new(ScriptedEmbedder { vectors: HashMap::new(), default: vec![1.0, 0.0] }));
    let ranker = HybridRanker::new(corpus, h.store.clone(), other.service.clone(), h.expander.clone());
    let err = ranker.search("cat", 2).await.expect_err("dimension mismatch");
    assert!(matches!(err, Error::DimensionMismatch { expected: 8, actual: 2 }));
}

#[test]
fn fusion_is_invariant_to_lexical_scale() {
    let lexical = [2.5f32, 0.0, 1.25, 0.4];
    let semantic = [0.1f32, 0.9, 0.5, 0.3];
    let scaled: Vec<f32> = lexical.iter().map(|s| s * 40.0).collect();

    let base = fuse(&lexical, &semantic, 0.5);
    let other = fuse(&scaled, &semantic, 0.5);
    assert_eq!(top_k_indices(&base, 4), top_k_indices(&other, 4));
    for (a, b) in base.iter().zip(&other) {
        assert!((a.fused - b.fused).abs() < 1e-5);
    }
}

#[test]
fn normalization_handles_constant_and_empty_input() {
    assert!(min_max_normalize(&[]).is_empty());
    assert_eq!(min_max_normalize(&[3.0, 3.0]), vec![0.0, 0.0]);
    let n = min_max_normalize(&[1.0, 3.0, 2.0]);
    assert!(n[0].abs() < 1e-6 && (n[1] - 1.0).abs() < 1e-6 && (n[2] - 0.5).abs() < 1e-6);
}

#[test]
fn ties_keep_chunk_order() {
    let s = |fused| ScoreVector { lexical: 0.0, semantic: 0.0, fused };
    let scores = [s(0.2), s(0.7), s(0.7), s(0.1), s(0.7)];
    assert_eq!(top_k_indices(&scores, 4), vec![1, 2, 4, 0]);
}

#[tokio::test]
async fn synonyms_reach_the_lexical_index() {
    let thesaurus = Thesaurus::from_map(HashMap::from([("kitten".to_string(), vec!["cat".to_string()])]));
    let h = harness_with(Arc::new(VocabEmbedder::new()), Arc::new(thesaurus));
    let corpus = h.ingest(scenario()).await;
    let ranker = HybridRanker::new(corpus, h.store.clone(), h.service.clone(), h.expander.clone())
        .with_embedding_weight(0.0)
        .expect("weight");

    let results = ranker.search("kitten", 2).await.expect("search");
    assert_eq!(ids(&results), vec![0, 2]);
    assert!(results[0].scores.lexical > 0.9);
}

#[tokio::test]
async fn saved_corpus_ranks_identically_after_load() {
    let h = harness(Arc::new(VocabEmbedder::new()));
    let corpus = h.ingest(scenario()).await;
    let before = HybridRanker::new(corpus.clone(), h.store.clone(), h.service.clone(), h.expander.clone())
        .search("loyal dogs", 3)
        .await
        .expect("search");

    let path = h._tmp.path().join("corpus").join("book.json");
    corpus.save(&path).expect("save");
    let loaded = Arc::new(BookCorpus::load(&path).expect("load"));
    assert_eq!(loaded.chunks(), corpus.chunks());
    assert_eq!(loaded.metadata(), corpus.metadata());

    let store = Arc::new(ExactBackend::new());
    loaded.populate(store.as_ref()).await.expect("populate");
    let after = HybridRanker::new(loaded, store, h.service.clone(), h.expander.clone())
        .search("loyal dogs", 3)
        .await
        .expect("search");
    assert_eq!(before, after);
}

#[test]
fn load_rejects_unknown_versions_and_bad_records() {
    let tmp = tempfile::tempdir().expect("tmp");
    let path = tmp.path().join("corpus.json");

    std::fs::write(&path, r#"{"version":"v9","chunks":[],"features":[],"embeddings":[]}"#).expect("write");
    assert!(matches!(BookCorpus::load(&path), Err(Error::Corpus(_))));

    std::fs::write(
        &path,
        r#"{"version":"v1","chunks":[{"id":0,"text":"a","source_offset":0}],"features":[{"dates":[],"entities":[],"key_phrases":[]}],"embeddings":[]}"#,
    )
    .expect("write");
    assert!(matches!(BookCorpus::load(&path), Err(Error::Corpus(_))));
}
