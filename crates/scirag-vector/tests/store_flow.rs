use scirag_core::config::StoreSettings;
use scirag_core::traits::{Embedder, VectorIndex};
use scirag_core::types::{DistanceMetric, NewChunk, SourceKind};
use scirag_core::Error;
use scirag_embed::HashingEmbedder;
use scirag_vector::LanceChunkStore;
use tempfile::TempDir;

const DIM: usize = 64;

fn settings(tmp: &TempDir) -> StoreSettings {
    StoreSettings { uri: tmp.path().join("lancedb").to_string_lossy().into_owned(), table: "chunks_test".into(), ..Default::default() }
}

async fn new_chunk(embedder: &HashingEmbedder, section: Option<&str>, position: u32, body: &str) -> NewChunk {
    NewChunk {
        title: "Molecular Biology of the Cell".into(),
        section: section.map(str::to_string),
        position,
        body: body.into(),
        embedding: Some(embedder.embed(body).await.expect("embed")),
    }
}

#[tokio::test]
async fn lancedb_store_flow() {
    let tmp = TempDir::new().expect("tmp");
    let embedder = HashingEmbedder::new(DIM);
    let store = LanceChunkStore::open(&settings(&tmp), DIM).await.expect("open");

    let query = embedder.embed("kinase signalling").await.expect("embed");
    assert!(store.nearest(&query, DistanceMetric::Cosine, 5).await.expect("empty table").is_empty());

    let first = store
        .insert(new_chunk(&embedder, Some("Signalling"), 0, "kinase signalling cascades amplify growth signals").await)
        .await
        .expect("insert");
    store.insert(new_chunk(&embedder, None, 0, "chloroplasts perform photosynthesis").await).await.expect("insert");
    let mut pending = new_chunk(&embedder, Some("Signalling"), 1, "kinase kinase kinase").await;
    pending.embedding = None;
    let pending = store.insert(pending).await.expect("insert without embedding");
    assert_eq!(store.count().await.expect("count"), 3);

    let hits = store.nearest(&query, DistanceMetric::Cosine, 10).await.expect("search");
    assert_eq!(hits.len(), 2, "chunk without embedding is not searchable");
    assert_eq!(hits[0].chunk.id, first.id);
    assert!(hits.iter().all(|h| h.source == SourceKind::Vector && h.chunk.id != pending.id));
    assert!(hits[0].score > hits[1].score);
    assert!(hits.iter().any(|h| h.chunk.section.is_none()));

    let err = store
        .insert(new_chunk(&embedder, Some("Signalling"), 0, "another body").await)
        .await
        .expect_err("duplicate");
    assert!(matches!(err, Error::DuplicateChunk { existing, .. } if existing == first.id), "got {err:?}");

    let all = store.scan().await.expect("scan");
    assert_eq!(all.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(all[2].embedding.is_none());
}

#[tokio::test]
async fn reopen_continues_ids_and_checks_width() {
    let tmp = TempDir::new().expect("tmp");
    let embedder = HashingEmbedder::new(DIM);
    {
        let store = LanceChunkStore::open(&settings(&tmp), DIM).await.expect("open");
        store.insert(new_chunk(&embedder, Some("Enzymes"), 0, "enzyme kinetics").await).await.expect("insert");
    }
    let store = LanceChunkStore::open(&settings(&tmp), DIM).await.expect("reopen");
    let next = store.insert(new_chunk(&embedder, Some("Enzymes"), 1, "michaelis menten").await).await.expect("insert");
    assert_eq!(next.id, 2);

    let err = LanceChunkStore::open(&settings(&tmp), DIM * 2).await.err().expect("width mismatch");
    assert!(matches!(err, Error::DimensionMismatch { expected: DIM, .. }), "got {err:?}");

    let wrong = store.nearest(&[0.5; 3], DistanceMetric::Cosine, 1).await.expect_err("short query vector");
    assert!(matches!(wrong, Error::DimensionMismatch { .. }));
}
