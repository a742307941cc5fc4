//! OpenAI-compatible HTTP client: embeddings and chat completions.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use bookqa_core::config::{EmbeddingSettings, GenerationSettings};
use bookqa_core::error::{Error, ProviderError, ProviderErrorKind, Result};
use bookqa_core::traits::{AnswerGenerator, EmbeddingProvider};
use bookqa_core::types::Embedding;

const SYSTEM_PROMPT: &str = "You are a helpful assistant specialized in extracting precise information from texts. \
Focus on providing accurate information. If the exact information is not available, explain what is known and what is missing.";

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    max_tokens: u32,
    temperature: f32,
    id: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiClient {
    /// Build from settings; the API key is read from `embedding.api_key_env`.
    pub fn from_settings(embedding: &EmbeddingSettings, generation: &GenerationSettings) -> Result<Self> {
        let api_key = std::env::var(&embedding.api_key_env)
            .map_err(|_| Error::Config(format!("{} not set", embedding.api_key_env)))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(embedding.timeout_secs))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            base_url: embedding.api_base.trim_end_matches('/').to_string(),
            embedding_model: embedding.model.clone(),
            chat_model: generation.model.clone(),
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
            id: format!("openai:{}", embedding.model),
        })
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<R, ProviderError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(classify_status(status), format!("{url} returned {status}: {text}")));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Other, format!("invalid response body: {e}")))
    }
}

fn classify_status(status: StatusCode) -> ProviderErrorKind {
    match status.as_u16() {
        429 => ProviderErrorKind::RateLimited,
        401 | 403 => ProviderErrorKind::Auth,
        408 | 504 => ProviderErrorKind::Timeout,
        500..=599 => ProviderErrorKind::Connection,
        _ => ProviderErrorKind::Other,
    }
}

fn classify_transport(e: reqwest::Error) -> ProviderError {
    let kind = if e.is_timeout() {
        ProviderErrorKind::Timeout
    } else if e.is_connect() || e.is_request() {
        ProviderErrorKind::Connection
    } else {
        ProviderErrorKind::Other
    };
    ProviderError::new(kind, e.to_string())
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn create(&self, texts: &[String]) -> std::result::Result<Vec<Embedding>, ProviderError> {
        let request = EmbeddingRequest { model: &self.embedding_model, input: texts };
        let mut response: EmbeddingResponse = self.post("embeddings", &request).await?;
        response.data.sort_by_key(|d| d.index);
        debug!(inputs = texts.len(), returned = response.data.len(), "embeddings response");
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiClient {
    async fn generate(&self, query: &str, context: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage { role: "system".into(), content: SYSTEM_PROMPT.into() },
                ChatMessage {
                    role: "user".into(),
                    content: format!(
                        "Context: {context}\n\nQuestion: {query}\n\nProvide a concise answer based on the context. \
                         If specific information is not available, briefly explain what is known and what is missing."
                    ),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let response: ChatResponse = self.post("chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::Other, "no choices in completion").into())
    }
}
