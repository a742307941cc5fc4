use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use bookqa_core::error::{Error, ProviderError, ProviderErrorKind};
use bookqa_core::traits::EmbeddingProvider;
use bookqa_core::types::{Embedding, ProgressEvent};
use bookqa_embed::{EmbeddingCache, EmbeddingService, FakeEmbedder, RetryPolicy};

/// Returns `[n, 1.0]` for input `"t<n>"`; batches holding `t0` finish last.
/// Fails the first `failures` calls with `kind`.
struct MockProvider {
    calls: AtomicUsize,
    failures: AtomicUsize,
    kind: ProviderErrorKind,
    dims: Option<Vec<usize>>,
    short: bool,
}

impl MockProvider {
    fn ok() -> Self {
        Self { calls: AtomicUsize::new(0), failures: AtomicUsize::new(0), kind: ProviderErrorKind::Other, dims: None, short: false }
    }

    fn failing(times: usize, kind: ProviderErrorKind) -> Self {
        Self { failures: AtomicUsize::new(times), kind, ..Self::ok() }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn sentinel(text: &str) -> f32 {
    text.trim_start_matches('t').parse::<f32>().unwrap_or(-1.0)
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn embedder_id(&self) -> &str {
        "mock"
    }

    async fn create(&self, texts: &[String]) -> Result<Vec<Embedding>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ProviderError::new(self.kind, "scripted failure"));
        }
        if texts.iter().any(|t| t == "t0") {
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
        let mut out: Vec<Embedding> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let dim = self.dims.as_ref().map_or(2, |d| d[i % d.len()]);
                let mut v = vec![1.0; dim];
                v[0] = sentinel(t);
                v
            })
            .collect();
        if self.short {
            out.pop();
        }
        Ok(out)
    }
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("t{i}")).collect()
}

fn service(provider: Arc<MockProvider>, dir: &TempDir) -> EmbeddingService {
    let cache = Arc::new(EmbeddingCache::open(dir.path()).expect("cache"));
    EmbeddingService::new(provider, cache)
        .with_retry(RetryPolicy::new(3, Duration::from_millis(1)))
        .with_max_concurrency(4)
}

#[tokio::test]
async fn output_order_matches_input_order() {
    let tmp = TempDir::new().expect("tmp");
    let provider = Arc::new(MockProvider::ok());
    let svc = service(provider.clone(), &tmp);
    let out = svc.create_embeddings(&texts(9), 2).await.expect("embed");
    assert_eq!(out.len(), 9);
    for (i, v) in out.iter().enumerate() {
        assert_eq!(v[0], i as f32, "slot {i}");
    }
    assert_eq!(provider.calls(), 5);
}

#[tokio::test]
async fn second_call_is_served_from_cache() {
    let tmp = TempDir::new().expect("tmp");
    let provider = Arc::new(MockProvider::ok());
    let svc = service(provider.clone(), &tmp);
    let first = svc.create_embeddings(&texts(5), 2).await.expect("embed");
    let calls = provider.calls();
    let second = svc.create_embeddings(&texts(5), 2).await.expect("embed");
    assert_eq!(provider.calls(), calls);
    assert_eq!(first, second);
    assert_eq!(svc.cache().stats().hits, 5);
}

#[tokio::test]
async fn duplicate_texts_are_embedded_once() {
    let tmp = TempDir::new().expect("tmp");
    let provider = Arc::new(MockProvider::ok());
    let svc = service(provider.clone(), &tmp);
    let input = vec!["t3".to_string(), "t3 ".to_string(), "t4".to_string()];
    let out = svc.create_embeddings(&input, 10).await.expect("embed");
    assert_eq!(out[0], out[1]);
    assert_eq!(out[2][0], 4.0);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let tmp = TempDir::new().expect("tmp");
    let provider = Arc::new(MockProvider::failing(2, ProviderErrorKind::RateLimited));
    let svc = service(provider.clone(), &tmp);
    let out = svc.create_embeddings(&texts(3), 10).await.expect("embed after retries");
    assert_eq!(provider.calls(), 3);
    assert_eq!(out[2][0], 2.0);
}

#[tokio::test]
async fn exhausted_retries_surface_provider_error() {
    let tmp = TempDir::new().expect("tmp");
    let provider = Arc::new(MockProvider::failing(10, ProviderErrorKind::Timeout));
    let svc = service(provider.clone(), &tmp);
    let err = svc.create_embeddings(&texts(2), 10).await.expect_err("should fail");
    assert!(matches!(err, Error::Provider(ProviderError { kind: ProviderErrorKind::Timeout, .. })));
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn auth_errors_are_not_retried() {
    let tmp = TempDir::new().expect("tmp");
    let provider = Arc::new(MockProvider::failing(1, ProviderErrorKind::Auth));
    let svc = service(provider.clone(), &tmp);
    let err = svc.create_embeddings(&texts(2), 10).await.expect_err("should fail");
    assert!(matches!(err, Error::Provider(ProviderError { kind: ProviderErrorKind::Auth, .. })));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn inconsistent_dimensions_are_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let provider = Arc::new(MockProvider { dims: Some(vec![2, 3]), ..MockProvider::ok() });
    let svc = service(provider, &tmp);
    let err = svc.create_embeddings(&texts(2), 10).await.expect_err("should fail");
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
}

#[tokio::test]
async fn wrong_vector_count_is_a_provider_error() {
    let tmp = TempDir::new().expect("tmp");
    let provider = Arc::new(MockProvider { short: true, ..MockProvider::ok() });
    let svc = service(provider, &tmp);
    let err = svc.create_embeddings(&texts(3), 10).await.expect_err("should fail");
    assert!(matches!(err, Error::Provider(ProviderError { kind: ProviderErrorKind::Other, .. })));
}

#[tokio::test]
async fn zero_batch_size_is_a_config_error() {
    let tmp = TempDir::new().expect("tmp");
    let svc = service(Arc::new(MockProvider::ok()), &tmp);
    assert!(matches!(svc.create_embeddings(&texts(1), 0).await, Err(Error::Config(_))));
}

#[tokio::test]
async fn cancellation_interrupts_backoff() {
    let tmp = TempDir::new().expect("tmp");
    let provider = Arc::new(MockProvider::failing(10, ProviderErrorKind::RateLimited));
    let cache = Arc::new(EmbeddingCache::open(tmp.path()).expect("cache"));
    let svc = EmbeddingService::new(provider, cache).with_retry(RetryPolicy::new(3, Duration::from_secs(60)));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let err = svc.create_embeddings_with_cancel(&texts(2), 10, &cancel).await.expect_err("cancelled");
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn progress_reports_each_batch() {
    let tmp = TempDir::new().expect("tmp");
    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::default();
    let sink = events.clone();
    let svc = service(Arc::new(MockProvider::ok()), &tmp)
        .with_progress(Arc::new(move |e: ProgressEvent| sink.lock().expect("lock").push(e)));
    svc.create_embeddings(&texts(5), 2).await.expect("embed");
    let events = events.lock().expect("lock");
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.stage == "embeddings" && e.total == 3));
    assert_eq!(events.last().map(|e| e.current), Some(3));
}

#[tokio::test]
async fn fake_embedder_is_deterministic_and_normalized() {
    let tmp = TempDir::new().expect("tmp");
    let cache = Arc::new(EmbeddingCache::open(tmp.path()).expect("cache"));
    let svc = EmbeddingService::new(Arc::new(FakeEmbedder::new(32)), cache);
    let a = svc.embed_one("the cat sat").await.expect("embed");
    let b = FakeEmbedder::new(32).embed_text("the cat sat");
    assert_eq!(a, b);
    let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn cached_vectors_of_differing_width_are_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let cache = Arc::new(EmbeddingCache::open(tmp.path()).expect("cache"));
    cache.put(&EmbeddingCache::key_for("a"), &[1.0, 0.0]).expect("put a");
    cache.put(&EmbeddingCache::key_for("b"), &[1.0, 0.0, 0.0]).expect("put b");
    let provider = Arc::new(MockProvider::ok());
    let svc = EmbeddingService::new(provider.clone(), cache);

    let err = svc.create_embeddings(&["a".to_string(), "b".to_string()], 10).await.expect_err("should fail");
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn query_embeddings_read_but_do_not_fill_the_cache() {
    let tmp = TempDir::new().expect("tmp");
    let provider = Arc::new(MockProvider::ok());
    let svc = service(provider.clone(), &tmp);

    let fresh = svc.embed_query("t7").await.expect("embed");
    assert_eq!(fresh, vec![7.0, 1.0]);
    assert_eq!(provider.calls(), 1);
    assert!(svc.cache().get(&EmbeddingCache::key_for("t7")).is_none());

    svc.create_embeddings(&["t4".to_string()], 10).await.expect("embed");
    let calls = provider.calls();
    let cached = svc.embed_query("t4").await.expect("embed");
    assert_eq!(cached, vec![4.0, 1.0]);
    assert_eq!(provider.calls(), calls);
}
