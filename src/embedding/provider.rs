/// Embedding provider trait and the Ollama-backed implementation
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Client initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding request failed: {0}")]
    RequestError(String),

    #[error("Embedding response malformed: {0}")]
    MalformedResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Trait for embedding providers
///
/// Allows abstraction over different embedding backends; the engine holds a
/// `dyn EmbeddingProvider` and the test suite substitutes a stub.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate the embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Ollama-style HTTP embedding provider
///
/// POSTs `{"model", "prompt"}` to `{endpoint}/api/embeddings` and expects
/// `{"embedding": [...]}` back. No retry here: interactive queries fail
/// fast, retry-with-backoff belongs to the offline backfill job.
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::RequestError(e.to_string()))?
            .error_for_status()
            .map_err(|e| EmbeddingError::RequestError(e.to_string()))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

        parse_embedding(&payload)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Pull the vector out of an embeddings response
fn parse_embedding(payload: &Value) -> Result<Vec<f32>, EmbeddingError> {
    let values = payload
        .get("embedding")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            EmbeddingError::MalformedResponse("response has no 'embedding' array".to_string())
        })?;

    if values.is_empty() {
        return Err(EmbeddingError::MalformedResponse(
            "provider returned an empty embedding".to_string(),
        ));
    }

    values
        .iter()
        .map(|value| {
            value.as_f64().map(|f| f as f32).ok_or_else(|| {
                EmbeddingError::MalformedResponse(
                    "embedding contains a non-numeric entry".to_string(),
                )
            })
        })
        .collect()
}
