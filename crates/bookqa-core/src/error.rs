//! Error taxonomy shared by every crate in the workspace.
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Vector store failed: {0}")]
    Store(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corrupt cache entry {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Lexical index failed: {0}")]
    Index(String),

    #[error("Invalid corpus: {0}")]
    Corpus(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Classification of embedding/generation provider failures.
///
/// Only the transient kinds are retried by the embedding service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimited,
    Timeout,
    Connection,
    Auth,
    Other,
}

impl ProviderErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Connection)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "rate limited",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Auth => "auth",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Provider error ({kind}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
