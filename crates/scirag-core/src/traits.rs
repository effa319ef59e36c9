use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::{Chunk, DistanceMetric, NewChunk, RetrievedCandidate};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Width of every vector this embedder returns.
    fn dim(&self) -> usize;
    /// Deterministic for identical input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Metric the index was built with.
    fn metric(&self) -> DistanceMetric;
    async fn insert(&self, chunk: NewChunk) -> Result<Chunk>;
    /// Up to `k` chunks closest to `vector`, best first. Chunks without an
    /// embedding never appear.
    async fn nearest(&self, vector: &[f32], metric: DistanceMetric, k: usize) -> Result<Vec<RetrievedCandidate>>;
    /// Every stored chunk, used to (re)build the lexical index.
    async fn scan(&self) -> Result<Vec<Chunk>>;
}

#[async_trait]
pub trait LexicalIndex: Send + Sync {
    fn index(&self, chunks: &[Chunk]) -> Result<()>;
    /// Raw engine scores, higher is better; the retriever normalizes them.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedCandidate>>;
}

/// Items of a streaming completion. `Done` is the explicit end signal; a
/// stream that ends without it was cut off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Token(String),
    Done,
}

pub type GenerationStream = BoxStream<'static, Result<GenerationEvent>>;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate_stream(&self, prompt: &str) -> Result<GenerationStream>;
}
