use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use scirag_core::error::{Error, Result};
use scirag_core::traits::VectorIndex;
use scirag_core::types::{Chunk, DistanceMetric, NewChunk, RetrievedCandidate, SourceKind};

use crate::check_width;

/// Brute-force vector index held in process memory.
///
/// Same contract as the LanceDB store: unique (title, section, position),
/// sequential ids, chunks without an embedding are skipped by `nearest`.
pub struct MemoryVectorIndex {
    metric: DistanceMetric,
    dim: usize,
    rows: RwLock<Vec<Chunk>>,
}

impl MemoryVectorIndex {
    pub fn new(metric: DistanceMetric, dim: usize) -> Self { Self { metric, dim, rows: RwLock::new(Vec::new()) } }

    pub fn len(&self) -> usize { self.rows.read().map(|r| r.len()).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

fn poisoned<T>(_: T) -> Error { Error::StoreUnavailable("memory index lock poisoned".to_string()) }

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn metric(&self) -> DistanceMetric { self.metric }

    async fn insert(&self, new: NewChunk) -> Result<Chunk> {
        check_width(self.dim, new.embedding.as_deref())?;
        let mut rows = self.rows.write().map_err(poisoned)?;
        if let Some(existing) =
            rows.iter().find(|c| c.title == new.title && c.section == new.section && c.position == new.position)
        {
            return Err(Error::DuplicateChunk {
                title: new.title,
                section: new.section.unwrap_or_else(|| "<none>".to_string()),
                position: new.position,
                existing: existing.id,
            });
        }
        let id = rows.last().map_or(1, |c| c.id + 1);
        let chunk = Chunk {
            id,
            title: new.title,
            section: new.section,
            position: new.position,
            body: new.body,
            embedding: new.embedding,
            created_at: Utc::now(),
        };
        rows.push(chunk.clone());
        Ok(chunk)
    }

    async fn nearest(&self, vector: &[f32], metric: DistanceMetric, k: usize) -> Result<Vec<RetrievedCandidate>> {
        if metric != self.metric {
            return Err(Error::InvalidConfig(format!(
                "query metric {metric:?} does not match index metric {:?}",
                self.metric
            )));
        }
        check_width(self.dim, Some(vector))?;
        let rows = self.rows.read().map_err(poisoned)?;
        let mut scored: Vec<(f32, &Chunk)> = rows
            .iter()
            .filter_map(|c| c.embedding.as_deref().map(|e| (metric.distance(vector, e), c)))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(d, c)| RetrievedCandidate { chunk: c.clone(), score: metric.similarity(d), source: SourceKind::Vector })
            .collect())
    }

    async fn scan(&self) -> Result<Vec<Chunk>> { Ok(self.rows.read().map_err(poisoned)?.clone()) }
}
