#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use bookqa_core::chunker::TextChunker;
use bookqa_core::error::{Error, ProviderError, ProviderErrorKind, Result};
use bookqa_core::nlp::{HeuristicAnnotator, NoSynonyms};
use bookqa_core::traits::{AnswerGenerator, EmbeddingProvider, SynonymSource, VectorStore};
use bookqa_core::types::{Embedding, IndexEntry, SearchFilter, VectorMatch};
use bookqa_embed::{EmbeddingCache, EmbeddingService, RetryPolicy};
use bookqa_hybrid::{BookCorpus, IngestInput, IngestionPipeline, QueryExpander};
use bookqa_vector::ExactBackend;

pub const VOCAB: &[&str] = &["cat", "sat", "mat", "dog", "loyal", "companion", "common", "pet"];

pub fn scenario() -> Vec<String> {
    vec![
        "the cat sat on the mat".to_string(),
        "dogs are loyal companions".to_string(),
        "cats and dogs are common pets".to_string(),
    ]
}

/// Bag-of-words over `VOCAB` with a naive plural strip. Can fail its first
/// `failures` calls with `kind`.
pub struct VocabEmbedder {
    pub calls: AtomicUsize,
    failures: AtomicUsize,
    kind: ProviderErrorKind,
}

impl VocabEmbedder {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0), failures: AtomicUsize::new(0), kind: ProviderErrorKind::Other }
    }

    pub fn failing(times: usize, kind: ProviderErrorKind) -> Self {
        Self { failures: AtomicUsize::new(times), kind, ..Self::new() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Embedding {
        let mut v = vec![0.0f32; VOCAB.len()];
        for word in text.split_whitespace() {
            let w = word.to_lowercase();
            let w = if w.len() > 3 { w.strip_suffix('s').unwrap_or(&w).to_string() } else { w };
            if let Some(i) = VOCAB.iter().position(|&x| x == w) {
                v[i] += 1.0;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for VocabEmbedder {
    fn embedder_id(&self) -> &str {
        "vocab"
    }

    async fn create(&self, texts: &[String]) -> std::result::Result<Vec<Embedding>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ProviderError::new(self.kind, "scripted failure"));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Fixed vectors for known texts; everything else (queries) gets `default`.
pub struct ScriptedEmbedder {
    pub vectors: HashMap<String, Embedding>,
    pub default: Embedding,
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    fn embedder_id(&self) -> &str {
        "scripted"
    }

    async fn create(&self, texts: &[String]) -> std::result::Result<Vec<Embedding>, ProviderError> {
        Ok(texts.iter().map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| self.default.clone())).collect())
    }
}

pub struct UnavailableStore;

#[async_trait]
impl VectorStore for UnavailableStore {
    fn is_available(&self) -> bool {
        false
    }

    async fn store(&self, _entries: &[IndexEntry]) -> Result<()> {
        Err(Error::StoreUnavailable("test store".into()))
    }

    async fn search(&self, _query: &[f32], _top_k: usize, _filter: Option<&SearchFilter>) -> Result<Vec<VectorMatch>> {
        Err(Error::StoreUnavailable("test store".into()))
    }

    async fn clear(&self) -> Result<()> {
        Err(Error::StoreUnavailable("test store".into()))
    }
}

/// Records every context it is asked to answer from.
#[derive(Default)]
pub struct RecordingGenerator {
    pub contexts: Mutex<Vec<String>>,
}

#[async_trait]
impl AnswerGenerator for RecordingGenerator {
    async fn generate(&self, query: &str, context: &str) -> Result<String> {
        self.contexts.lock().expect("lock").push(context.to_string());
        Ok(format!("answer to {query}"))
    }
}

pub struct Harness {
    pub _tmp: TempDir,
    pub service: Arc<EmbeddingService>,
    pub store: Arc<dyn VectorStore>,
    pub expander: Arc<QueryExpander>,
}

pub fn harness(provider: Arc<dyn EmbeddingProvider>) -> Harness {
    harness_with(provider, Arc::new(NoSynonyms))
}

pub fn harness_with(provider: Arc<dyn EmbeddingProvider>, synonyms: Arc<dyn SynonymSource>) -> Harness {
    let tmp = TempDir::new().expect("tmp");
    let cache = Arc::new(EmbeddingCache::open(tmp.path().join("cache")).expect("cache"));
    let service = Arc::new(
        EmbeddingService::new(provider, cache).with_retry(RetryPolicy::new(1, std::time::Duration::from_millis(1))),
    );
    let annotator = Arc::new(HeuristicAnnotator::new().expect("annotator"));
    let expander = Arc::new(QueryExpander::new(annotator, synonyms, 3).expect("expander"));
    Harness { _tmp: tmp, service, store: Arc::new(ExactBackend::new()), expander }
}

impl Harness {
    pub fn pipeline(&self) -> IngestionPipeline {
        let annotator = Arc::new(HeuristicAnnotator::new().expect("annotator"));
        IngestionPipeline::new(
            TextChunker::new(300, 150).expect("chunker"),
            annotator,
            Arc::clone(&self.service),
            Arc::clone(&self.store),
        )
    }

    pub async fn ingest(&self, parts: Vec<String>) -> Arc<BookCorpus> {
        let corpus = self.pipeline().create_from_text(IngestInput::Chunks(parts)).await.expect("ingest");
        Arc::new(corpus)
    }
}
