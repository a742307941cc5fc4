use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bookqa_core::chunker::{chunks_from_parts, TextChunker};
use bookqa_core::config::Settings;
use bookqa_core::error::{Error, Result};
use bookqa_core::traits::{Annotator, VectorStore};
use bookqa_core::types::{Chunk, ChunkFeatures, Embedding, ProgressCallback, ProgressEvent};
use bookqa_embed::EmbeddingService;

use crate::corpus::BookCorpus;

const STAGES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Chunked,
    FeaturesExtracted,
    Embedded,
    Stored,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub enum IngestInput {
    Text(String),
    /// Text already split by the caller; each part becomes one chunk.
    Chunks(Vec<String>),
}

pub struct IngestionPipeline {
    chunker: TextChunker,
    annotator: Arc<dyn Annotator>,
    embeddings: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    embedding_attempts: usize,
    max_concurrency: usize,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
    state: PipelineState,
}

impl IngestionPipeline {
    pub fn new(
        chunker: TextChunker,
        annotator: Arc<dyn Annotator>,
        embeddings: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            chunker,
            annotator,
            embeddings,
            store,
            batch_size: 100,
            embedding_attempts: 2,
            max_concurrency: 8,
            progress: None,
            cancel: CancellationToken::new(),
            state: PipelineState::Created,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        annotator: Arc<dyn Annotator>,
        embeddings: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let mut pipeline = Self::new(TextChunker::from_settings(&settings.chunking)?, annotator, embeddings, store);
        pipeline.batch_size = settings.embedding.batch_size;
        pipeline.embedding_attempts = settings.pipeline.embedding_attempts.max(1);
        pipeline.max_concurrency = settings.embedding.max_concurrency.max(1);
        Ok(pipeline)
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_embedding_attempts(mut self, n: usize) -> Self {
        self.embedding_attempts = n.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn report(&self, stage: &'static str, current: usize) {
        if let Some(cb) = &self.progress {
            cb(ProgressEvent { stage, current, total: STAGES });
        }
    }

    /// Build a corpus from `input`. Any error leaves the pipeline in
    /// `Failed` and no corpus is returned.
    pub async fn create_from_text(&mut self, input: IngestInput) -> Result<BookCorpus> {
        self.state = PipelineState::Created;
        match self.run(input).await {
            Ok(corpus) => {
                self.state = PipelineState::Ready;
                Ok(corpus)
            }
            Err(e) => {
                warn!(error = %e, "ingestion failed");
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    async fn run(&mut self, input: IngestInput) -> Result<BookCorpus> {
        self.report("start", 0);
        let chunks = match input {
            IngestInput::Text(text) => self.chunker.chunk(&text),
            IngestInput::Chunks(parts) => chunks_from_parts(parts),
        };
        self.state = PipelineState::Chunked;
        info!(chunks = chunks.len(), "chunked input");

        let features = self.extract_features(&chunks).await;
        self.state = PipelineState::FeaturesExtracted;
        self.report("features", 1);

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = if texts.is_empty() { Vec::new() } else { self.embed_with_retry(&texts).await? };
        self.state = PipelineState::Embedded;
        self.report("embeddings", 2);

        let corpus = BookCorpus::new(chunks, features, embeddings)?;
        if !corpus.is_empty() {
            self.store.clear().await?;
            corpus.populate(self.store.as_ref()).await?;
        }
        self.state = PipelineState::Stored;
        self.report("storage", 3);

        info!(chunks = corpus.len(), dim = ?corpus.dim(), "corpus ready");
        self.report("done", 4);
        Ok(corpus)
    }

    /// Per-chunk annotation on the blocking pool; output order follows chunk order.
    async fn extract_features(&self, chunks: &[Chunk]) -> Vec<ChunkFeatures> {
        let jobs = chunks.iter().map(|chunk| {
            let annotator = Arc::clone(&self.annotator);
            let text = chunk.text.clone();
            let id = chunk.id;
            async move {
                match tokio::task::spawn_blocking(move || annotate(annotator.as_ref(), id, &text)).await {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(chunk = id, error = %e, "feature extraction task failed");
                        ChunkFeatures::default()
                    }
                }
            }
        });
        stream::iter(jobs).buffered(self.max_concurrency).collect().await
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut attempt = 1;
        loop {
            match self.embeddings.create_embeddings_with_cancel(texts, self.batch_size, &self.cancel).await {
                Err(Error::Provider(e)) if e.is_retryable() && attempt < self.embedding_attempts => {
                    warn!(attempt, error = %e, "embedding stage failed, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn annotate(annotator: &dyn Annotator, id: usize, text: &str) -> ChunkFeatures {
    let or_empty = |what: &str, r: anyhow::Result<Vec<String>>| {
        r.unwrap_or_else(|e| {
            warn!(chunk = id, error = %e, "{what} extraction failed");
            Vec::new()
        })
    };
    ChunkFeatures {
        dates: or_empty("date", annotator.extract_dates(text)),
        entities: or_empty("entity", annotator.extract_entities(text)),
        key_phrases: or_empty("key phrase", annotator.extract_key_phrases(text)),
    }
}
