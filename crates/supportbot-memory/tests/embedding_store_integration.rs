use std::path::Path;

use supportbot_llm::any::AnyProvider;
use supportbot_llm::mock::MockProvider;
use supportbot_memory::document::SplitterConfig;
use supportbot_memory::{BuildOutcome, Distance, EmbeddingStore, StoreConfig, StoreError};

const CORPUS: &str = "Beem offers Everdraft cash advances.\n\nFile taxes for free with Beem.";

fn provider() -> AnyProvider {
    AnyProvider::Mock(MockProvider::default().with_embeddings([
        ("Beem offers Everdraft cash advances.\n\n", vec![1.0, 0.0, 0.0]),
        ("File taxes for free with Beem.", vec![0.0, 1.0, 0.0]),
        ("How do I get cash?", vec![0.9, 0.1, 0.0]),
        ("Can I file taxes?", vec![0.1, 0.9, 0.0]),
        ("wrong size", vec![1.0, 0.0]),
    ]))
}

fn store(persist: &Path, distance: Distance) -> EmbeddingStore {
    EmbeddingStore::new(
        Box::new(provider().embed_fn()),
        StoreConfig {
            persist_dir: persist.to_path_buf(),
            distance,
            splitter: SplitterConfig {
                enabled: true,
                chunk_size: 40,
                chunk_overlap: 0,
                sentence_aware: true,
            },
            ..StoreConfig::default()
        },
    )
}

fn corpus(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("beem.txt");
    std::fs::write(&path, CORPUS).unwrap();
    path
}

#[tokio::test]
async fn build_and_query_with_mock_embeddings() {
    let dir = tempfile::tempdir().unwrap();
    let file = corpus(dir.path());
    let store = store(&dir.path().join("Beem"), Distance::L2);

    let outcome = store.build_or_load(true, Some(&file)).await.unwrap();
    assert_eq!(outcome, BuildOutcome::Built { chunks: 2 });

    let hits = store.query("How do I get cash?", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].content.contains("Everdraft"));
    assert!(hits[0].distance <= hits[1].distance);

    let hits = store.query("Can I file taxes?", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("taxes"));
}

#[tokio::test]
async fn cosine_index_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let file = corpus(dir.path());
    let persist = dir.path().join("Beem");

    store(&persist, Distance::Cosine)
        .build_or_load(true, Some(&file))
        .await
        .unwrap();

    // Configured metric differs; the persisted one wins.
    let reopened = store(&persist, Distance::L2);
    let outcome = reopened.build_or_load(false, None).await.unwrap();
    assert_eq!(outcome, BuildOutcome::Loaded { chunks: 2 });
    assert_eq!(reopened.manifest().unwrap().distance, Distance::Cosine);

    let hits = reopened.query("Can I file taxes?", 5).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].content.contains("taxes"));
}

#[tokio::test]
async fn query_dimension_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let file = corpus(dir.path());
    let store = store(&dir.path().join("Beem"), Distance::L2);
    store.build_or_load(true, Some(&file)).await.unwrap();

    assert!(matches!(
        store.query("wrong size", 1).await,
        Err(StoreError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[tokio::test]
async fn failing_embedder_leaves_store_uninitialized() {
    let dir = tempfile::tempdir().unwrap();
    let file = corpus(dir.path());
    let mut mock = MockProvider::default();
    mock.fail_embed = true;
    let store = EmbeddingStore::new(
        Box::new(AnyProvider::Mock(mock).embed_fn()),
        StoreConfig {
            persist_dir: dir.path().join("Beem"),
            ..StoreConfig::default()
        },
    );

    assert!(matches!(
        store.build_or_load(true, Some(&file)).await,
        Err(StoreError::Embedding(_))
    ));
    assert!(matches!(
        store.query("anything", 2).await,
        Err(StoreError::Uninitialized)
    ));
}
