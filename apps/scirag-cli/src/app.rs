use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use scirag_answer::{Answerer, OllamaGenerator};
use scirag_core::config::{expand_path, Settings, StoreBackend};
use scirag_core::error::Error;
use scirag_core::traits::{Embedder, Generator, LexicalIndex, VectorIndex};
use scirag_core::types::{Chunk, NewChunk, DEFAULT_SECTION};
use scirag_retrieval::{ContextAssembler, Retriever, RetrieverOptions};
use scirag_text::TantivyLexicalIndex;
use scirag_vector::{LanceChunkStore, MemoryVectorIndex};

/// Body of `/chunks/auto` and `/chunks/raw`, and one line of an ingest file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub book_title: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub chunk_idx: u32,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Store writes: embed when needed, insert, and keep the lexical index in step.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    lexical: Option<Arc<dyn LexicalIndex>>,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorIndex>, lexical: Option<Arc<dyn LexicalIndex>>) -> Self {
        Self { embedder, vectors, lexical }
    }

    /// Embed `body` and insert.
    pub async fn insert_auto(&self, payload: ChunkPayload) -> scirag_core::Result<Chunk> {
        let embedding = self.embedder.embed(&payload.body).await?;
        self.insert(payload, embedding).await
    }

    /// Insert with the caller's embedding.
    pub async fn insert_raw(&self, mut payload: ChunkPayload) -> scirag_core::Result<Chunk> {
        let embedding = payload
            .embedding
            .take()
            .ok_or_else(|| Error::InvalidRequest("raw insert needs an embedding".to_string()))?;
        self.insert(payload, embedding).await
    }

    async fn insert(&self, payload: ChunkPayload, embedding: Vec<f32>) -> scirag_core::Result<Chunk> {
        let chunk = NewChunk {
            title: payload.book_title,
            section: Some(payload.section.unwrap_or_else(|| DEFAULT_SECTION.to_string())),
            position: payload.chunk_idx,
            body: payload.body,
            embedding: Some(embedding),
        };
        let stored = self.vectors.insert(chunk).await?;
        // The store is the source of truth; a lexical miss is repaired by the rebuild at startup.
        if let Some(lexical) = &self.lexical {
            if let Err(e) = lexical.index(std::slice::from_ref(&stored)) {
                tracing::warn!(id = stored.id, error = %e, "chunk stored but not lexically indexed");
            }
        }
        Ok(stored)
    }
}

/// Everything a request handler needs; shared read-only behind `Arc`.
pub struct AppState {
    pub settings: Settings,
    pub retriever: Arc<Retriever>,
    pub answerer: Answerer,
    pub ingestor: Ingestor,
}

impl AppState {
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
        lexical: Option<Arc<dyn LexicalIndex>>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let mut retriever = Retriever::new(embedder.clone(), vectors.clone(), RetrieverOptions::from(&settings));
        if let Some(lexical) = &lexical {
            retriever = retriever.with_lexical(lexical.clone());
        }
        let retriever = Arc::new(retriever);
        let answerer = Answerer::new(
            retriever.clone(),
            ContextAssembler::new(settings.context.max_chars),
            generator,
            Duration::from_secs(settings.generation.timeout_secs),
        );
        let ingestor = Ingestor::new(embedder, vectors, lexical);
        Self { settings, retriever, answerer, ingestor }
    }

    /// Open the configured store and collaborators.
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let embedder = scirag_embed::from_settings(&settings.embedding)?;
        let vectors = open_vectors(&settings).await?;
        let lexical = open_lexical(&settings, vectors.as_ref()).await?;
        let generator: Arc<dyn Generator> = Arc::new(OllamaGenerator::new(&settings.generation)?);
        Ok(Self::new(settings, embedder, vectors, lexical, generator))
    }
}

pub async fn open_vectors(settings: &Settings) -> Result<Arc<dyn VectorIndex>> {
    let dim = settings.embedding.dim;
    Ok(match settings.store.backend {
        StoreBackend::Lance => Arc::new(
            LanceChunkStore::open(&settings.store, dim)
                .await
                .with_context(|| format!("opening chunk store at {}", settings.store.uri))?,
        ),
        StoreBackend::Memory => {
            tracing::warn!("using in-memory chunk store; data is lost on exit");
            Arc::new(MemoryVectorIndex::new(settings.store.metric, dim))
        }
    })
}

/// Build the lexical index from every stored chunk, when enabled.
async fn open_lexical(settings: &Settings, vectors: &dyn VectorIndex) -> Result<Option<Arc<dyn LexicalIndex>>> {
    if !settings.lexical.enabled {
        return Ok(None);
    }
    let index = match &settings.lexical.index_dir {
        Some(dir) => TantivyLexicalIndex::create_in_dir(&expand_path(dir))?,
        None => TantivyLexicalIndex::create_in_ram()?,
    };
    let chunks = vectors.scan().await?;
    index.index(&chunks)?;
    tracing::info!(chunks = chunks.len(), "lexical index built");
    Ok(Some(Arc::new(index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scirag_core::types::{DistanceMetric, RetrievedCandidate};
    use scirag_embed::HashingEmbedder;

    struct BrokenLexical;

    #[async_trait]
    impl LexicalIndex for BrokenLexical {
        fn index(&self, _chunks: &[Chunk]) -> scirag_core::Result<()> {
            Err(Error::StoreUnavailable("lexical writer poisoned".into()))
        }

        async fn search(&self, _query: &str, _k: usize) -> scirag_core::Result<Vec<RetrievedCandidate>> { Ok(Vec::new()) }
    }

    fn payload(body: &str) -> ChunkPayload {
        ChunkPayload { book_title: "Cell Biology".into(), section: None, chunk_idx: 0, body: body.into(), embedding: None }
    }

    #[tokio::test]
    async fn lexical_failure_does_not_fail_a_stored_insert() {
        let vectors = Arc::new(MemoryVectorIndex::new(DistanceMetric::Cosine, 32));
        let ingestor = Ingestor::new(Arc::new(HashingEmbedder::new(32)), vectors.clone(), Some(Arc::new(BrokenLexical)));

        let stored = ingestor.insert_auto(payload("Kinases are enzymes.")).await.expect("stored");
        assert_eq!(stored.section.as_deref(), Some(DEFAULT_SECTION));
        assert_eq!(vectors.scan().await.expect("scan").len(), 1);
        assert!(matches!(ingestor.insert_auto(payload("again")).await, Err(Error::DuplicateChunk { .. })));
    }
}
