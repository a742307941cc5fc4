//! bookqa-embed
//!
//! Embedding creation for corpora and queries: a content-addressed disk cache,
//! the batching/retrying [`EmbeddingService`], and providers (OpenAI over HTTP,
//! deterministic fake).
pub mod cache;
pub mod fake;
pub mod openai;
pub mod retry;
pub mod service;

pub use cache::{CacheStats, EmbeddingCache};
pub use fake::{use_fake_embeddings, FakeEmbedder};
pub use openai::OpenAiClient;
pub use retry::RetryPolicy;
pub use service::EmbeddingService;
