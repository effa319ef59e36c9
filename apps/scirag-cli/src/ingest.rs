use std::path::Path;

use anyhow::{Context, Result};

use scirag_core::error::Error;

use crate::app::{ChunkPayload, Ingestor};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Insert every line of a JSONL file of [`ChunkPayload`]s. Lines with an
/// `embedding` are inserted as-is, the rest are embedded first. Duplicates
/// are counted and skipped; any other error stops the import.
pub async fn ingest_jsonl(ingestor: &Ingestor, path: &Path) -> Result<IngestReport> {
    let text = tokio::fs::read_to_string(path).await.with_context(|| format!("reading {}", path.display()))?;
    let mut report = IngestReport::default();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() { continue; }
        let payload: ChunkPayload =
            serde_json::from_str(line).with_context(|| format!("{}:{}: invalid chunk", path.display(), n + 1))?;
        let result = if payload.embedding.is_some() {
            ingestor.insert_raw(payload).await
        } else {
            ingestor.insert_auto(payload).await
        };
        match result {
            Ok(chunk) => {
                report.inserted += 1;
                tracing::debug!(id = chunk.id, line = n + 1, "ingested");
            }
            Err(e @ Error::DuplicateChunk { .. }) => {
                report.duplicates += 1;
                tracing::warn!(line = n + 1, error = %e, "skipping duplicate");
            }
            Err(e) => return Err(e).with_context(|| format!("{}:{}", path.display(), n + 1)),
        }
    }
    tracing::info!(inserted = report.inserted, duplicates = report.duplicates, path = %path.display(), "ingest complete");
    Ok(report)
}
