//! Domain types shared by the chunker, indices, ranker and pipeline.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Dense position of a chunk in its corpus (0..n).
pub type ChunkId = usize;
pub type Embedding = Vec<f32>;

/// A contiguous span of the source text.
///
/// - `id`: dense index shared by the lexical and semantic indices
/// - `text`: the words of the span joined by single spaces
/// - `source_offset`: byte offset of the first word in the source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub source_offset: usize,
}

/// Annotations extracted from one chunk during ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFeatures {
    pub dates: Vec<String>,
    pub entities: Vec<String>,
    pub key_phrases: Vec<String>,
}

impl ChunkFeatures {
    pub fn has_date(&self) -> bool {
        !self.dates.is_empty()
    }

    pub fn has_name(&self) -> bool {
        !self.entities.is_empty()
    }
}

/// Corpus-wide union of chunk features, deduplicated in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusMetadata {
    pub dates: Vec<String>,
    pub entities: Vec<String>,
    pub key_phrases: Vec<String>,
}

impl CorpusMetadata {
    pub fn from_features(features: &[ChunkFeatures]) -> Self {
        let mut meta = Self::default();
        for f in features {
            push_unique(&mut meta.dates, &f.dates);
            push_unique(&mut meta.entities, &f.entities);
            push_unique(&mut meta.key_phrases, &f.key_phrases);
        }
        meta
    }
}

fn push_unique(dst: &mut Vec<String>, src: &[String]) {
    for s in src {
        if !dst.contains(s) {
            dst.push(s.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub text: String,
    pub has_date: bool,
    pub has_name: bool,
}

/// One row handed to a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: ChunkId,
    pub vector: Embedding,
    pub metadata: EntryMetadata,
}

/// A vector store hit. `score` is cosine similarity, higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub metadata: EntryMetadata,
}

/// Optional metadata predicate applied by vector stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub has_date: Option<bool>,
    pub has_name: Option<bool>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.has_date.is_none() && self.has_name.is_none()
    }

    pub fn matches(&self, meta: &EntryMetadata) -> bool {
        self.has_date.map_or(true, |want| meta.has_date == want)
            && self.has_name.map_or(true, |want| meta.has_name == want)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Russian,
}

/// Coarse part-of-speech classes used for expansion and weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PosTag {
    Noun,
    ProperNoun,
    Verb,
    Adjective,
    Adverb,
    Other,
}

impl PosTag {
    /// Whether synonyms are looked up for tokens with this tag.
    pub fn is_expandable(self) -> bool {
        matches!(self, Self::Noun | Self::ProperNoun | Self::Verb | Self::Adjective)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedToken {
    pub token: String,
    pub pos: PosTag,
    pub weight: f32,
}

/// A user question after analysis, expansion and weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub raw: String,
    pub language: Language,
    pub is_factual: bool,
    pub expanded_tokens: Vec<WeightedToken>,
    pub filter: Option<SearchFilter>,
}

impl Query {
    pub fn tokens(&self) -> Vec<String> {
        self.expanded_tokens.iter().map(|t| t.token.clone()).collect()
    }
}

/// Per-chunk scores for one query, each normalized into [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector {
    pub lexical: f32,
    pub semantic: f32,
    pub fused: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: &'static str,
    pub current: usize,
    pub total: usize,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Cosine similarity; 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}
