use scirag_core::config::{EmbeddingProvider, EmbeddingSettings};
use scirag_core::Error;
use scirag_embed::from_settings;

#[tokio::test]
async fn hashing_provider_from_settings() {
    let settings = EmbeddingSettings { provider: EmbeddingProvider::Hashing, dim: 128, ..Default::default() };
    let embedder = from_settings(&settings).expect("embedder");
    assert_eq!(embedder.dim(), 128);

    let v1 = embedder.embed("hello world").await.expect("embed");
    let v2 = embedder.embed("hello world").await.expect("embed");
    assert_eq!(v1.len(), 128, "embedding dim is 128");
    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[tokio::test]
async fn unreachable_ollama_is_an_embedding_failure() {
    // Nothing listens on port 9 (discard) on loopback in test environments.
    let settings = EmbeddingSettings {
        provider: EmbeddingProvider::Ollama,
        url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..Default::default()
    };
    let embedder = from_settings(&settings).expect("embedder");
    let err = embedder.embed("anything").await.expect_err("no server");
    assert!(matches!(err, Error::EmbeddingFailure(_)), "got {err:?}");
    assert!(err.is_transient());
}
