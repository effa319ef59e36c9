use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use scirag_core::config::Settings;
use scirag_core::error::{Error, Result};
use scirag_core::traits::{Embedder, LexicalIndex, VectorIndex};
use scirag_core::types::{validate_top_k, ChunkId, RetrievedCandidate, ScoredChunk, SourceKind};

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverOptions {
    pub candidate_multiplier: usize,
    pub vector_weight: f32,
    pub lexical_weight: f32,
    pub retry_backoff: Duration,
}

impl Default for RetrieverOptions {
    fn default() -> Self { Self::from(&Settings::default()) }
}

impl From<&Settings> for RetrieverOptions {
    fn from(s: &Settings) -> Self {
        Self {
            candidate_multiplier: s.retrieval.candidate_multiplier.max(1),
            vector_weight: s.retrieval.vector_weight,
            lexical_weight: s.retrieval.lexical_weight,
            retry_backoff: Duration::from_millis(s.retrieval.retry_backoff_ms),
        }
    }
}

/// Query → ranked chunks, over a vector index and an optional lexical index.
///
/// Shared read-only between requests; all state lives in the collaborators.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    lexical: Option<Arc<dyn LexicalIndex>>,
    options: RetrieverOptions,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorIndex>, options: RetrieverOptions) -> Self {
        Self { embedder, vectors, lexical: None, options }
    }

    pub fn with_lexical(mut self, lexical: Arc<dyn LexicalIndex>) -> Self {
        self.lexical = Some(lexical);
        self
    }

    /// At most `top_k` candidates, best first, unique by chunk id.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedCandidate>> {
        let top_k = validate_top_k(top_k)?;
        if query.trim().is_empty() {
            return Err(Error::InvalidRequest("query must not be empty".to_string()));
        }

        let vector = self.retry_once("embed", || self.embedder.embed(query)).await?;
        if vector.len() != self.embedder.dim() {
            return Err(Error::DimensionMismatch { expected: self.embedder.dim(), actual: vector.len() });
        }

        let fetch = top_k.saturating_mul(self.options.candidate_multiplier).max(top_k);
        let metric = self.vectors.metric();
        let dense = self.retry_once("nearest", || self.vectors.nearest(&vector, metric, fetch)).await?;

        let candidates = match &self.lexical {
            None => collapse(dense),
            Some(lexical) => {
                let sparse = self.retry_once("lexical", || lexical.search(query, fetch)).await?;
                self.fuse(dense, sparse)
            }
        };
        let mut ranked = candidates;
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.chunk.id.cmp(&b.chunk.id)));
        ranked.truncate(top_k);
        tracing::debug!(top_k, fetch, returned = ranked.len(), lexical = self.lexical.is_some(), "retrieved candidates");
        Ok(ranked)
    }

    /// `retrieve` in the wire shape returned by `/search`.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        Ok(self.retrieve(query, top_k).await?.into_iter().map(ScoredChunk::from).collect())
    }

    async fn retry_once<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match call().await {
            Err(e) if e.is_transient() => {
                tracing::warn!(op, error = %e, backoff_ms = self.options.retry_backoff.as_millis() as u64, "transient failure; retrying once");
                tokio::time::sleep(self.options.retry_backoff).await;
                call().await
            }
            other => other,
        }
    }

    fn fuse(&self, dense: Vec<RetrievedCandidate>, sparse: Vec<RetrievedCandidate>) -> Vec<RetrievedCandidate> {
        struct Fused {
            candidate: RetrievedCandidate,
            vector: f32,
            lexical: f32,
        }

        let (wv, wl) = (self.options.vector_weight, self.options.lexical_weight);
        let best_bm25 = sparse.iter().map(|c| c.score).fold(0.0f32, f32::max);
        let mut by_id: HashMap<ChunkId, Fused> = HashMap::new();

        for c in dense {
            let score = c.score;
            by_id
                .entry(c.chunk.id)
                .and_modify(|f| f.vector = f.vector.max(score))
                .or_insert(Fused { candidate: c, vector: score, lexical: 0.0 });
        }
        for c in sparse {
            let score = if best_bm25 > 0.0 { c.score / best_bm25 } else { 0.0 };
            // Keep the vector copy of the chunk when both sides found it.
            by_id
                .entry(c.chunk.id)
                .and_modify(|f| f.lexical = f.lexical.max(score))
                .or_insert(Fused { candidate: c, vector: 0.0, lexical: score });
        }

        by_id
            .into_values()
            .map(|f| {
                let (v, l) = (wv * f.vector, wl * f.lexical);
                let source = if l > v { SourceKind::Lexical } else { SourceKind::Vector };
                RetrievedCandidate { score: v + l, source, ..f.candidate }
            })
            .collect()
    }
}

/// Unique by id, keeping the best score.
fn collapse(candidates: Vec<RetrievedCandidate>) -> Vec<RetrievedCandidate> {
    let mut by_id: HashMap<ChunkId, RetrievedCandidate> = HashMap::new();
    for c in candidates {
        by_id
            .entry(c.chunk.id)
            .and_modify(|old| if c.score > old.score { *old = c.clone(); })
            .or_insert(c);
    }
    by_id.into_values().collect()
}
