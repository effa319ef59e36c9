use thiserror::Error;

use crate::types::ChunkId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("Embedding dim mismatch: got {actual} expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Chunk already exists: book={title}, section={section}, idx={position} (id={existing})")]
    DuplicateChunk { title: String, section: String, position: u32, existing: ChunkId },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Transient failures get a single retry in the retriever; everything else
    /// goes straight to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::EmbeddingFailure(_))
    }

    pub fn store(err: impl std::fmt::Display) -> Self { Error::StoreUnavailable(format!("{err:#}")) }

    pub fn embedding(err: impl std::fmt::Display) -> Self { Error::EmbeddingFailure(format!("{err:#}")) }

    pub fn generation(err: impl std::fmt::Display) -> Self { Error::GenerationFailure(format!("{err:#}")) }
}

pub type Result<T> = std::result::Result<T, Error>;
