//! scirag-vector
//!
//! Vector index adapters: a LanceDB-backed chunk store and an in-memory
//! brute-force index with the same semantics.

use scirag_core::error::{Error, Result};

pub mod memory;
pub mod schema;
pub mod store;
pub mod table;

pub use memory::MemoryVectorIndex;
pub use store::LanceChunkStore;

/// Reject embeddings whose width differs from the index width.
pub(crate) fn check_width(expected: usize, embedding: Option<&[f32]>) -> Result<()> {
    match embedding {
        Some(v) if v.len() != expected => Err(Error::DimensionMismatch { expected, actual: v.len() }),
        _ => Ok(()),
    }
}
