//! Cache-first, batched, retrying embedding creation.
use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bookqa_core::config::EmbeddingSettings;
use bookqa_core::error::{Error, ProviderError, ProviderErrorKind, Result};
use bookqa_core::traits::EmbeddingProvider;
use bookqa_core::types::{Embedding, ProgressCallback, ProgressEvent};

use crate::cache::EmbeddingCache;
use crate::retry::RetryPolicy;

/// Texts sharing one cache key; embedded once, written to every index.
struct Pending {
    key: String,
    indices: Vec<usize>,
}

pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    retry: RetryPolicy,
    max_concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: Arc<EmbeddingCache>) -> Self {
        Self { provider, cache, retry: RetryPolicy::default(), max_concurrency: 8, progress: None }
    }

    pub fn from_settings(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        settings: &EmbeddingSettings,
    ) -> Self {
        Self::new(provider, cache)
            .with_retry(RetryPolicy::from_settings(settings))
            .with_max_concurrency(settings.max_concurrency)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn embedder_id(&self) -> &str {
        self.provider.embedder_id()
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub async fn create_embeddings(&self, texts: &[String], batch_size: usize) -> Result<Vec<Embedding>> {
        self.create_embeddings_with_cancel(texts, batch_size, &CancellationToken::new()).await
    }

    pub async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let mut out = self.create_embeddings(&[text.to_string()], 1).await?;
        out.pop().ok_or_else(|| Error::from(ProviderError::new(ProviderErrorKind::Other, "no embedding returned")))
    }

    /// Embed a search query. Reads the cache but never writes it, so query
    /// traffic does not grow the chunk cache.
    pub async fn embed_query(&self, text: &str) -> Result<Embedding> {
        if let Some(v) = self.cache.get(&EmbeddingCache::key_for(text)) {
            return Ok(v);
        }
        let out = self.call_with_retry(&[text.to_string()], &CancellationToken::new()).await?;
        match <[Embedding; 1]>::try_from(out) {
            Ok([v]) => Ok(v),
            Err(out) => Err(ProviderError::new(
                ProviderErrorKind::Other,
                format!("provider returned {} vectors for 1 input", out.len()),
            )
            .into()),
        }
    }

    /// Returns exactly one vector per input, in input order, regardless of
    /// the order in which batches complete.
    pub async fn create_embeddings_with_cancel(
        &self,
        texts: &[String],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>> {
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut slots: Vec<Option<Embedding>> = vec![None; texts.len()];
        let mut pending: Vec<Pending> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        for (i, text) in texts.iter().enumerate() {
            let key = EmbeddingCache::key_for(text);
            if let Some(&p) = by_key.get(&key) {
                pending[p].indices.push(i);
                continue;
            }
            match self.cache.get(&key) {
                Some(v) => slots[i] = Some(v),
                None => {
                    by_key.insert(key.clone(), pending.len());
                    pending.push(Pending { key, indices: vec![i] });
                }
            }
        }

        let mut expected_dim = slots.iter().flatten().map(Vec::len).next();
        if let Some(d) = expected_dim {
            if let Some(bad) = slots.iter().flatten().find(|v| v.len() != d) {
                return Err(Error::DimensionMismatch { expected: d, actual: bad.len() });
            }
        }
        let hits = texts.len() - pending.iter().map(|p| p.indices.len()).sum::<usize>();
        let batches: Vec<Vec<Pending>> = chunk_owned(pending, batch_size);
        let total = batches.len();
        info!(texts = texts.len(), cache_hits = hits, batches = total, "creating embeddings");

        let mut results = stream::iter(batches.into_iter().map(|batch| async move {
            let inputs: Vec<String> = batch.iter().map(|p| texts[p.indices[0]].clone()).collect();
            let vectors = self.call_with_retry(&inputs, cancel).await?;
            Ok::<_, Error>((batch, vectors))
        }))
        .buffer_unordered(self.max_concurrency);

        let mut completed = 0;
        while let Some(res) = results.next().await {
            let (batch, vectors) = res?;
            if vectors.len() != batch.len() {
                return Err(ProviderError::new(
                    ProviderErrorKind::Other,
                    format!("provider returned {} vectors for {} inputs", vectors.len(), batch.len()),
                )
                .into());
            }
            for (p, v) in batch.iter().zip(vectors) {
                match expected_dim {
                    Some(d) if d != v.len() => return Err(Error::DimensionMismatch { expected: d, actual: v.len() }),
                    Some(_) => {}
                    None => expected_dim = Some(v.len()),
                }
                if let Err(e) = self.cache.put(&p.key, &v) {
                    warn!(key = %p.key, error = %e, "failed to write embedding cache");
                }
                for &i in &p.indices {
                    slots[i] = Some(v.clone());
                }
            }
            completed += 1;
            self.report(completed, total);
        }

        slots
            .into_iter()
            .map(|s| s.ok_or_else(|| Error::from(ProviderError::new(ProviderErrorKind::Other, "missing embedding"))))
            .collect()
    }

    async fn call_with_retry(&self, batch: &[String], cancel: &CancellationToken) -> Result<Vec<Embedding>> {
        let mut attempt: u32 = 0;
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                r = self.provider.create(batch) => r,
            };
            match result {
                Ok(vectors) => {
                    debug!(size = batch.len(), attempt, "embedding batch done");
                    return Ok(vectors);
                }
                Err(e) if e.is_retryable() && (attempt as usize) + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(attempt = attempt + 1, kind = %e.kind, delay_ms = delay.as_millis() as u64, "embedding batch failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn report(&self, current: usize, total: usize) {
        if let Some(cb) = &self.progress {
            cb(ProgressEvent { stage: "embeddings", current, total });
        }
    }
}

fn chunk_owned<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut out = Vec::new();
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        out.push(iter.by_ref().take(size).collect());
    }
    out
}
