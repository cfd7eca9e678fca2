//! Generic HTTP implementation of [`EmbeddingClient`] (spec §6). Speaks the
//! same OpenAI-compatible wire shape `backend.rs` uses for chat completion,
//! the common denominator across self-hosted and vendor embedding
//! endpoints.

use async_trait::async_trait;
use raidcore_core::{CoreError, EmbeddingClient};
use serde::{Deserialize, Serialize};

use crate::error::ModelEngineError;

#[derive(Debug, Clone)]
pub struct HttpEmbeddingClientConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub request_timeout_ms: u64,
}

pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    config: HttpEmbeddingClientConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: HttpEmbeddingClientConfig) -> Result<Self, ModelEngineError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ModelEngineError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let body = EmbeddingRequest { model: &self.config.model, input: text };

        let mut req = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(ModelEngineError::from)?;
        if !response.status().is_success() {
            return Err(ModelEngineError::Status(response.status().as_u16()).into());
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ModelEngineError::Decode(e.to_string()))?;

        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ModelEngineError::Decode("empty embeddings data array".into()))?;

        if datum.embedding.len() != self.config.dimension {
            return Err(CoreError::EmbeddingDimensionMismatch {
                expected: self.config.dimension,
                got: datum.embedding.len(),
            });
        }

        Ok(datum.embedding)
    }
}
