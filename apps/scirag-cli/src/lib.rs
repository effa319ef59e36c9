//! scirag-cli
//!
//! The HTTP service (`/search`, `/query/stream`, `/health`, chunk ingest),
//! its client, and JSONL import, as used by the `scirag` binary.

pub mod app;
pub mod client;
pub mod ingest;
pub mod server;

pub use app::{AppState, ChunkPayload, Ingestor};
pub use client::ApiClient;
pub use ingest::{ingest_jsonl, IngestReport};
pub use server::{router, serve, serve_on};
