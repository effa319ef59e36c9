use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scirag_core::traits::{Embedder, LexicalIndex, VectorIndex};
use scirag_core::types::{Chunk, DistanceMetric, NewChunk, RetrievedCandidate, SourceKind};
use scirag_core::{Error, Result};
use scirag_embed::HashingEmbedder;
use scirag_retrieval::{ContextAssembler, Retriever, RetrieverOptions};
use scirag_text::TantivyLexicalIndex;
use scirag_vector::MemoryVectorIndex;

const DIM: usize = 256;

fn options() -> RetrieverOptions { RetrieverOptions { retry_backoff: Duration::from_millis(5), ..Default::default() } }

async fn corpus(bodies: &[&str]) -> Arc<MemoryVectorIndex> {
    let embedder = HashingEmbedder::new(DIM);
    let index = Arc::new(MemoryVectorIndex::new(DistanceMetric::Cosine, DIM));
    for (i, body) in bodies.iter().enumerate() {
        let chunk = NewChunk {
            title: "Molecular Biology of the Cell".into(),
            section: Some("Chapter 15".into()),
            position: i as u32,
            body: body.to_string(),
            embedding: Some(embedder.embed_sync(body)),
        };
        index.insert(chunk).await.expect("insert");
    }
    index
}

/// Fails with a transient error the first `failures` times, then delegates.
struct Flaky<T> {
    inner: T,
    failures: usize,
    calls: AtomicUsize,
}

impl<T> Flaky<T> {
    fn new(inner: T, failures: usize) -> Self { Self { inner, failures, calls: AtomicUsize::new(0) } }

    fn trip(&self) -> bool { self.calls.fetch_add(1, Ordering::SeqCst) < self.failures }
}

#[async_trait]
impl Embedder for Flaky<HashingEmbedder> {
    fn dim(&self) -> usize { self.inner.dim() }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.trip() { return Err(Error::EmbeddingFailure("connection reset".into())); }
        self.inner.embed(text).await
    }
}

#[async_trait]
impl VectorIndex for Flaky<Arc<MemoryVectorIndex>> {
    fn metric(&self) -> DistanceMetric { self.inner.metric() }

    async fn insert(&self, chunk: NewChunk) -> Result<Chunk> { self.inner.insert(chunk).await }

    async fn nearest(&self, vector: &[f32], metric: DistanceMetric, k: usize) -> Result<Vec<RetrievedCandidate>> {
        if self.trip() { return Err(Error::StoreUnavailable("store restarting".into())); }
        self.inner.nearest(vector, metric, k).await
    }

    async fn scan(&self) -> Result<Vec<Chunk>> { self.inner.scan().await }
}

/// Embeds everything with the wrong width.
struct NarrowEmbedder;

#[async_trait]
impl Embedder for NarrowEmbedder {
    fn dim(&self) -> usize { DIM }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> { Ok(vec![0.1; 3]) }
}

/// Maps tokens onto a few hand-made concepts, so an abbreviation and its
/// expansion embed alike.
struct ConceptEmbedder;

impl ConceptEmbedder {
    fn concept(token: &str) -> Option<usize> {
        match token {
            "rtk" | "rtks" | "receptor" | "receptors" | "tyrosine" | "kinase" | "kinases" => Some(0),
            "growth" | "proliferation" => Some(1),
            "chloroplast" | "chloroplasts" | "photosynthesis" => Some(2),
            _ => None,
        }
    }
}

#[async_trait]
impl Embedder for ConceptEmbedder {
    fn dim(&self) -> usize { 4 }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0f32; 4];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            v[Self::concept(&token.to_lowercase()).unwrap_or(3)] += 1.0;
        }
        Ok(v)
    }
}

#[tokio::test]
async fn expanded_name_finds_abbreviated_chunk() {
    let embedder = Arc::new(ConceptEmbedder);
    let index = Arc::new(MemoryVectorIndex::new(DistanceMetric::Cosine, 4));
    let body = "RTKs regulate growth and differentiation.";
    let embedding = embedder.embed(body).await.expect("embed");
    let chunk = NewChunk { title: "Molecular Biology of the Cell".into(), section: None, position: 0, body: body.into(), embedding: Some(embedding) };
    assert_eq!(index.insert(chunk).await.expect("insert").id, 1);

    let retriever = Retriever::new(embedder, index, options());
    let hits = retriever.search("receptor tyrosine kinase", 1).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 1);
    assert!(hits[0].score > 0.0, "score {}", hits[0].score);
}

#[tokio::test]
async fn equal_scores_are_ordered_by_lowest_id() {
    let body = "Kinases phosphorylate substrates.";
    let retriever = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), corpus(&[body, body, body, body]).await, options());

    let hits = retriever.search(body, 3).await.expect("search");
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(hits.windows(2).all(|w| w[0].score == w[1].score));
}

#[tokio::test]
async fn rtk_question_finds_the_rtk_chunk() {
    let index = corpus(&[
        "Chloroplasts perform photosynthesis in plant cells.",
        "RTKs (receptor tyrosine kinases) regulate growth and differentiation.",
        "Mitochondria produce ATP through oxidative phosphorylation.",
    ])
    .await;
    let retriever = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), index, options());

    let hits = retriever.search("What are RTKs?", 1).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 2);
    assert_eq!(hits[0].section, "Chapter 15");
    assert_eq!(hits[0].source, SourceKind::Vector);
}

#[tokio::test]
async fn results_are_bounded_sorted_unique_and_deterministic() {
    let bodies: Vec<String> = (0..20).map(|i| format!("kinase cascade step {i} amplifies signal {}", i % 3)).collect();
    let refs: Vec<&str> = bodies.iter().map(String::as_str).collect();
    let retriever = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), corpus(&refs).await, options());

    let first = retriever.retrieve("kinase signal amplification", 7).await.expect("retrieve");
    assert_eq!(first.len(), 7);
    assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
    let mut ids: Vec<_> = first.iter().map(|c| c.chunk.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 7);

    let second = retriever.retrieve("kinase signal amplification", 7).await.expect("retrieve");
    assert_eq!(
        first.iter().map(|c| c.chunk.id).collect::<Vec<_>>(),
        second.iter().map(|c| c.chunk.id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn empty_corpus_returns_nothing() {
    let retriever = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), corpus(&[]).await, options());
    assert!(retriever.search("What are RTKs?", 5).await.expect("search").is_empty());
}

#[tokio::test]
async fn invalid_top_k_and_width_are_rejected() {
    let index = corpus(&["RTKs regulate growth."]).await;
    let retriever = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), index.clone(), options());
    assert!(matches!(retriever.search("rtks", 0).await, Err(Error::InvalidRequest(_))));
    assert!(matches!(retriever.search("rtks", 51).await, Err(Error::InvalidRequest(_))));

    let narrow = Retriever::new(Arc::new(NarrowEmbedder), index, options());
    assert!(matches!(narrow.search("rtks", 5).await, Err(Error::DimensionMismatch { expected: DIM, actual: 3 })));
}

#[tokio::test]
async fn transient_failures_are_retried_once() {
    let index = corpus(&["RTKs regulate growth."]).await;

    let embedder = Arc::new(Flaky::new(HashingEmbedder::new(DIM), 1));
    let store = Arc::new(Flaky::new(index.clone(), 1));
    let retriever = Retriever::new(embedder.clone(), store.clone(), options());
    assert_eq!(retriever.search("rtks", 5).await.expect("recovers after one retry").len(), 1);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);

    let down = Arc::new(Flaky::new(index, 2));
    let retriever = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), down.clone(), options());
    let err = retriever.search("rtks", 5).await.expect_err("second failure surfaces");
    assert!(matches!(err, Error::StoreUnavailable(_)));
    assert_eq!(down.calls.load(Ordering::SeqCst), 2, "no more than one retry");
}

#[tokio::test]
async fn lexical_fusion_lifts_exact_term_matches() {
    let index = corpus(&[
        "Receptor tyrosine kinases regulate growth.",
        "The Warburg effect describes aerobic glycolysis in tumours.",
        "Growth factors bind receptors on the cell surface.",
    ])
    .await;
    let lexical = Arc::new(TantivyLexicalIndex::create_in_ram().expect("lexical"));
    lexical.index(&index.scan().await.expect("scan")).expect("index");

    let retriever = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), index, options()).with_lexical(lexical);
    let hits = retriever.retrieve("Warburg glycolysis", 3).await.expect("retrieve");
    assert_eq!(hits[0].chunk.id, 2);
    assert!(hits[0].score <= 1.0 + 1e-6, "weighted sum of normalized scores");
    assert!(hits.iter().all(|h| h.score >= 0.0));
    let ids: Vec<_> = hits.iter().map(|h| h.chunk.id).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&1) && ids.contains(&3));
}

#[tokio::test]
async fn retrieved_candidates_assemble_into_cited_context() {
    let index = corpus(&["RTKs regulate growth.", "RTKs dimerize on ligand binding.", "Chloroplasts photosynthesize."]).await;
    let retriever = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), index, options());
    let candidates = retriever.retrieve("RTKs", 3).await.expect("retrieve");
    let first_id = candidates[0].chunk.id;

    let context = ContextAssembler::new(12_000).assemble(candidates);
    assert_eq!(context.len(), 3);
    assert_eq!(context.citation_of(first_id), Some(1));
}
