use std::collections::{HashMap, HashSet};

use scirag_core::types::{Chunk, ChunkId, RetrievedCandidate, SourceRef};

/// A context chunk with its 1-based citation number.
#[derive(Debug, Clone, PartialEq)]
pub struct CitedChunk {
    pub citation: usize,
    pub chunk: Chunk,
    pub score: f32,
}

impl CitedChunk {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            citation: self.citation,
            id: self.chunk.id,
            book_title: self.chunk.title.clone(),
            section: self.chunk.section_label().to_string(),
            chunk_idx: self.chunk.position,
            score: Some(self.score),
        }
    }
}

/// Ordered context for one answer. Citation numbers run 1..=len in rank order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedContext {
    entries: Vec<CitedChunk>,
    citations: HashMap<ChunkId, usize>,
}

impl RankedContext {
    pub fn entries(&self) -> &[CitedChunk] { &self.entries }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn by_citation(&self, citation: usize) -> Option<&CitedChunk> {
        citation.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn citation_of(&self, id: ChunkId) -> Option<usize> { self.citations.get(&id).copied() }

    pub fn total_chars(&self) -> usize { self.entries.iter().map(|e| e.chunk.body.chars().count()).sum() }
}

/// Turns ranked candidates into a bounded, citable context.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    max_chars: usize,
}

impl ContextAssembler {
    pub fn new(max_chars: usize) -> Self { Self { max_chars } }

    /// Dedupe by id (first wins), then drop the lowest-ranked whole chunks
    /// until the bodies fit in `max_chars` or a single chunk is left.
    pub fn assemble(&self, candidates: Vec<RetrievedCandidate>) -> RankedContext {
        let mut seen = HashSet::new();
        let mut kept: Vec<RetrievedCandidate> = Vec::with_capacity(candidates.len());
        for c in candidates {
            if seen.insert(c.chunk.id) { kept.push(c); }
        }

        let mut total: usize = kept.iter().map(|c| c.chunk.body.chars().count()).sum();
        while total > self.max_chars && kept.len() > 1 {
            if let Some(dropped) = kept.pop() {
                total -= dropped.chunk.body.chars().count();
                tracing::debug!(id = dropped.chunk.id, total, max_chars = self.max_chars, "dropped chunk over context budget");
            }
        }

        let entries: Vec<CitedChunk> = kept
            .into_iter()
            .enumerate()
            .map(|(i, c)| CitedChunk { citation: i + 1, chunk: c.chunk, score: c.score })
            .collect();
        let citations = entries.iter().map(|e| (e.chunk.id, e.citation)).collect();
        RankedContext { entries, citations }
    }
}
