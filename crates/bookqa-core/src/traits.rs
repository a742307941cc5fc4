use std::path::Path;

use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::types::{Embedding, IndexEntry, PosTag, SearchFilter, VectorMatch};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model, used to namespace the cache.
    fn embedder_id(&self) -> &str;
    /// Embed one batch. Must return one vector per input, in input order.
    async fn create(&self, texts: &[String]) -> std::result::Result<Vec<Embedding>, ProviderError>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn is_available(&self) -> bool;
    /// Upsert entries by chunk id.
    async fn store(&self, entries: &[IndexEntry]) -> Result<()>;
    /// Cosine search, sorted by descending score with ties broken by chunk id.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorMatch>>;
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, query: &str, context: &str) -> Result<String>;
}

/// Pure annotation functions consumed by the query expander and ingestion.
pub trait Annotator: Send + Sync {
    fn tokenize(&self, text: &str) -> anyhow::Result<Vec<String>>;
    fn pos_tag(&self, tokens: &[String]) -> anyhow::Result<Vec<PosTag>>;
    fn lemmatize(&self, token: &str, pos: PosTag) -> anyhow::Result<String>;
    fn extract_dates(&self, text: &str) -> anyhow::Result<Vec<String>>;
    fn extract_entities(&self, text: &str) -> anyhow::Result<Vec<String>>;
    fn extract_key_phrases(&self, text: &str) -> anyhow::Result<Vec<String>>;
}

pub trait SynonymSource: Send + Sync {
    fn synonyms(&self, word: &str, pos: PosTag) -> anyhow::Result<Vec<String>>;
}

pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String>;
}
