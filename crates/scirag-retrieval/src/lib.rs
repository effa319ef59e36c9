//! scirag-retrieval
//!
//! Query-time half of the pipeline: the `Retriever` embeds a question, asks
//! the vector index (and optionally the lexical index) for candidates and
//! fuses them; the `ContextAssembler` turns the ranked candidates into a
//! bounded context with stable citation numbers.

pub mod context;
pub mod retriever;

pub use context::{CitedChunk, ContextAssembler, RankedContext};
pub use retriever::{Retriever, RetrieverOptions};
