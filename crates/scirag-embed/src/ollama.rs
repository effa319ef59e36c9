use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use scirag_core::config::EmbeddingSettings;
use scirag_core::error::Error;
use scirag_core::traits::Embedder;
use scirag_core::Result;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embeddings from an Ollama-compatible `/api/embeddings` endpoint.
///
/// Width is not checked here; callers compare against the configured store
/// width and raise `DimensionMismatch`.
#[derive(Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dim: usize,
}

impl OllamaEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("embedding client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            dim: settings.dim,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest { model: &self.model, prompt: text };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Error::embedding)?;
        let body: EmbeddingResponse = response.json().await.map_err(Error::embedding)?;
        if body.embedding.is_empty() {
            return Err(Error::EmbeddingFailure(format!("model '{}' returned an empty embedding", self.model)));
        }
        Ok(body.embedding)
    }
}
