//! Domain types shared by the retrieval and answer pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type ChunkId = i64;

/// Section label used when a chunk was ingested without one.
pub const DEFAULT_SECTION: &str = "Full Text";
pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 50;

/// A stored unit of source text.
///
/// - `id`: opaque store-assigned identifier
/// - `title`/`section`/`position`: where the text came from; the triple is unique
/// - `embedding`: may be absent until computed; absent chunks are invisible to
///   vector search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    #[serde(rename = "book_title")]
    pub title: String,
    pub section: Option<String>,
    #[serde(rename = "chunk_idx")]
    pub position: u32,
    pub body: String,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn section_label(&self) -> &str { self.section.as_deref().unwrap_or(DEFAULT_SECTION) }
}

/// A chunk on its way into the store, before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub title: String,
    pub section: Option<String>,
    pub position: u32,
    pub body: String,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Search,
    Ask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub mode: QueryMode,
    pub top_k: usize,
}

impl Query {
    pub fn new(text: impl Into<String>, mode: QueryMode) -> Self {
        Self { text: text.into(), mode, top_k: DEFAULT_TOP_K }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Result<Self> {
        self.top_k = validate_top_k(top_k)?;
        Ok(self)
    }
}

pub fn validate_top_k(top_k: usize) -> Result<usize> {
    if (1..=MAX_TOP_K).contains(&top_k) {
        Ok(top_k)
    } else {
        Err(Error::InvalidRequest(format!("top_k must be between 1 and {MAX_TOP_K}, got {top_k}")))
    }
}

/// Indicates which adapter produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Vector,
    Lexical,
}

/// Distance function of the vector index. Queries must use the one the index
/// was built with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    L2,
}

impl DistanceMetric {
    /// Turn a store distance (lower = closer) into a similarity (higher = better).
    ///
    /// Cosine and dot distances are reported as `1 - x·y`; L2 is squared.
    pub fn similarity(self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine | DistanceMetric::Dot => 1.0 - distance,
            DistanceMetric::L2 => 1.0 / (1.0 + distance.max(0.0)),
        }
    }

    /// Distance between two vectors, in the same convention as `similarity` expects.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self {
            DistanceMetric::Dot => 1.0 - dot,
            DistanceMetric::Cosine => {
                let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 { 1.0 } else { 1.0 - dot / (na * nb) }
            }
            DistanceMetric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        }
    }
}

/// A chunk as returned by one of the search adapters.
///
/// `score` is always higher-is-better; `source` labels the adapter that
/// contributed most to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedCandidate {
    pub chunk: Chunk,
    pub score: f32,
    pub source: SourceKind,
}

/// Wire shape of a `search` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: ChunkId,
    pub book_title: String,
    pub section: String,
    pub chunk_idx: u32,
    pub body: String,
    pub score: f32,
    pub source: SourceKind,
}

impl From<RetrievedCandidate> for ScoredChunk {
    fn from(c: RetrievedCandidate) -> Self {
        let section = c.chunk.section_label().to_string();
        Self {
            id: c.chunk.id,
            book_title: c.chunk.title,
            section,
            chunk_idx: c.chunk.position,
            body: c.chunk.body,
            score: c.score,
            source: c.source,
        }
    }
}

/// One cited chunk in the terminal event of an answer stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub citation: usize,
    pub id: ChunkId,
    pub book_title: String,
    pub section: String,
    pub chunk_idx: u32,
    #[serde(default)]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Final { sources: Vec<SourceRef> },
}
