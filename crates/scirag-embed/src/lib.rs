//! Embedding collaborators: an Ollama-compatible HTTP client and a
//! deterministic hashing embedder for tests and offline runs.

use std::sync::Arc;

use scirag_core::config::{EmbeddingProvider, EmbeddingSettings};
use scirag_core::traits::Embedder;
use scirag_core::Result;

pub mod hashing;
pub mod ollama;

pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;

/// Build the embedder selected by `embedding.provider`.
pub fn from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.provider {
        EmbeddingProvider::Hashing => {
            tracing::info!(dim = settings.dim, "using hashing embedder");
            Ok(Arc::new(HashingEmbedder::new(settings.dim)))
        }
        EmbeddingProvider::Ollama => {
            tracing::info!(url = %settings.url, model = %settings.model, dim = settings.dim, "using ollama embedder");
            Ok(Arc::new(OllamaEmbedder::new(settings)?))
        }
    }
}
