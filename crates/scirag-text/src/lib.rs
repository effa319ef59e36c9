//! scirag-text
//!
//! Tantivy-backed lexical search over stored chunks, used to boost or back up
//! vector retrieval.

pub mod index;
pub mod tantivy_utils;

pub use index::TantivyLexicalIndex;
