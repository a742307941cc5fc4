//! Lexical + semantic score fusion.
//!
//! Both score arrays cover every chunk of the corpus. Each is min-max
//! normalized on its own, then blended as
//! `fused = (1 - w) * lexical + w * semantic`.
use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info};

use bookqa_core::config::SearchSettings;
use bookqa_core::error::{Error, Result};
use bookqa_core::traits::VectorStore;
use bookqa_core::types::{Chunk, Query, ScoreVector};
use bookqa_embed::EmbeddingService;

use crate::corpus::BookCorpus;
use crate::expander::QueryExpander;

const EPSILON: f32 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub scores: ScoreVector,
}

pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    scores.iter().map(|s| (s - min) / (max - min + EPSILON)).collect()
}

/// Normalize both arrays and blend them with weight `w` on the semantic side.
pub fn fuse(lexical: &[f32], semantic: &[f32], w: f32) -> Vec<ScoreVector> {
    let lex = min_max_normalize(lexical);
    let sem = min_max_normalize(semantic);
    lex.into_iter()
        .zip(sem)
        .map(|(l, s)| ScoreVector { lexical: l, semantic: s, fused: (1.0 - w) * l + w * s })
        .collect()
}

/// Indices of the `k` best fused scores, descending; equal scores keep chunk order.
pub fn top_k_indices(scores: &[ScoreVector], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].fused.partial_cmp(&scores[a].fused).unwrap_or(Ordering::Equal));
    order.truncate(k);
    order
}

pub struct HybridRanker {
    corpus: Arc<BookCorpus>,
    store: Arc<dyn VectorStore>,
    embeddings: Arc<EmbeddingService>,
    expander: Arc<QueryExpander>,
    embedding_weight: f32,
    use_metadata_filters: bool,
}

impl HybridRanker {
    pub fn new(
        corpus: Arc<BookCorpus>,
        store: Arc<dyn VectorStore>,
        embeddings: Arc<EmbeddingService>,
        expander: Arc<QueryExpander>,
    ) -> Self {
        Self { corpus, store, embeddings, expander, embedding_weight: 0.5, use_metadata_filters: false }
    }

    pub fn from_settings(
        corpus: Arc<BookCorpus>,
        store: Arc<dyn VectorStore>,
        embeddings: Arc<EmbeddingService>,
        expander: Arc<QueryExpander>,
        settings: &SearchSettings,
    ) -> Result<Self> {
        Ok(Self::new(corpus, store, embeddings, expander)
            .with_embedding_weight(settings.embedding_weight)?
            .with_metadata_filters(settings.use_metadata_filters))
    }

    pub fn with_embedding_weight(mut self, w: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&w) {
            return Err(Error::Config(format!("embedding_weight must be within [0, 1], got {w}")));
        }
        self.embedding_weight = w;
        Ok(self)
    }

    pub fn with_metadata_filters(mut self, enabled: bool) -> Self {
        self.use_metadata_filters = enabled;
        self
    }

    pub fn corpus(&self) -> &BookCorpus {
        &self.corpus
    }

    pub fn expander(&self) -> &QueryExpander {
        &self.expander
    }

    pub async fn search(&self, raw: &str, top_k: usize) -> Result<Vec<RankedChunk>> {
        let query = self.expander.prepare(raw);
        self.search_query(&query, top_k).await
    }

    pub async fn search_query(&self, query: &Query, top_k: usize) -> Result<Vec<RankedChunk>> {
        let n = self.corpus.len();
        if n == 0 || top_k == 0 || query.expanded_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let lexical = self
            .corpus
            .lexical()
            .score(&query.tokens())
            .map_err(|e| Error::Index(e.to_string()))?;
        let semantic = self.semantic_scores(query).await?;
        let scores = fuse(&lexical, &semantic, self.embedding_weight);

        let ranked: Vec<RankedChunk> = top_k_indices(&scores, top_k)
            .into_iter()
            .filter_map(|i| self.corpus.chunk(i).map(|c| RankedChunk { chunk: c.clone(), scores: scores[i] }))
            .collect();
        info!(query = %query.raw, results = ranked.len(), weight = self.embedding_weight, "hybrid search");
        Ok(ranked)
    }

    /// Cosine score per chunk. Chunks the store leaves out (filtered or
    /// missing) get the lowest score it did return.
    async fn semantic_scores(&self, query: &Query) -> Result<Vec<f32>> {
        let n = self.corpus.len();
        let text = self.expander.weighted_text(query);
        let vector = self.embeddings.embed_query(&text).await?;
        if let Some(dim) = self.corpus.dim() {
            if vector.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual: vector.len() });
            }
        }

        let filter = if self.use_metadata_filters { query.filter.as_ref() } else { None };
        let matches = self.store.search(&vector, n, filter).await?;
        let floor = matches.iter().map(|m| m.score).fold(f32::INFINITY, f32::min);
        let floor = if floor.is_finite() { floor } else { 0.0 };

        let mut scores = vec![floor; n];
        for m in &matches {
            if let Some(slot) = scores.get_mut(m.chunk_id) {
                *slot = m.score;
            }
        }
        debug!(returned = matches.len(), chunks = n, filtered = filter.is_some(), "semantic scores");
        Ok(scores)
    }
}
