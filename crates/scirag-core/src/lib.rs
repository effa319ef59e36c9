//! scirag-core
//!
//! Domain types, collaborator traits, the error taxonomy and the configuration
//! loader shared by the text, vector, retrieval and answer crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
