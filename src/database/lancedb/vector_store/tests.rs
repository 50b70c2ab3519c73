use super::*;
use tempfile::TempDir;

fn record(id: &str, vector: Vec<f32>, content: &str) -> ChunkRecord {
    let mut metadata = Map::new();
    metadata.insert(
        "source".to_string(),
        Value::String("https://shop.example/help".to_string()),
    );
    metadata.insert("title".to_string(), Value::String("Help".to_string()));

    ChunkRecord {
        id: id.to_string(),
        vector,
        content: content.to_string(),
        source: "https://shop.example/help".to_string(),
        metadata,
        chunk_index: 0,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

fn sample_records() -> Vec<ChunkRecord> {
    vec![
        record("1", vec![1.0, 0.0, 0.0], "refunds take 14 days"),
        record("2", vec![0.0, 1.0, 0.0], "shipping takes 3 days"),
        record("3", vec![0.7, 0.7, 0.0], "refunds and shipping"),
    ]
}

#[tokio::test]
async fn create_makes_directory_and_starts_empty() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("db");

    let store = VectorStore::create(&dir)
        .await
        .expect("should create vector store");

    assert!(dir.exists());
    assert_eq!(store.path(), dir.as_path());
    assert_eq!(store.vector_dimension(), None);
    assert_eq!(store.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn add_and_count() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::create(temp_dir.path())
        .await
        .expect("should create vector store");

    store
        .add(&sample_records())
        .await
        .expect("should store records");

    assert_eq!(store.vector_dimension(), Some(3));
    assert_eq!(store.count().await.expect("should count"), 3);
}

#[tokio::test]
async fn add_empty_is_noop() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::create(temp_dir.path())
        .await
        .expect("should create vector store");

    store.add(&[]).await.expect("empty add should succeed");

    assert_eq!(store.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn add_rejects_mixed_dimensions() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::create(temp_dir.path())
        .await
        .expect("should create vector store");

    store
        .add(&sample_records())
        .await
        .expect("should store records");
    let result = store.add(&[record("4", vec![1.0, 0.0], "short")]).await;

    assert!(matches!(result, Err(RagError::Database(_))));
}

#[tokio::test]
async fn search_orders_by_cosine_similarity() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::create(temp_dir.path())
        .await
        .expect("should create vector store");
    store
        .add(&sample_records())
        .await
        .expect("should store records");

    let results = store
        .search(&[1.0, 0.0, 0.0], 2)
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content, "refunds take 14 days");
    assert!((results[0].similarity_score - 1.0).abs() < 1e-4);
    assert_eq!(results[1].content, "refunds and shipping");
    assert!(results[0].similarity_score >= results[1].similarity_score);
}

#[tokio::test]
async fn search_round_trips_metadata_and_vectors() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::create(temp_dir.path())
        .await
        .expect("should create vector store");
    store
        .add(&sample_records())
        .await
        .expect("should store records");

    let results = store
        .search(&[0.0, 1.0, 0.0], 1)
        .await
        .expect("search should succeed");

    let top = &results[0];
    assert_eq!(top.vector, vec![0.0, 1.0, 0.0]);
    assert_eq!(top.source, "https://shop.example/help");
    assert_eq!(top.metadata["title"], "Help");
    assert_eq!(top.chunk_index, 0);
}

#[tokio::test]
async fn create_replaces_previous_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    {
        let mut store = VectorStore::create(temp_dir.path())
            .await
            .expect("should create vector store");
        store
            .add(&sample_records())
            .await
            .expect("should store records");
    }

    let mut store = VectorStore::create(temp_dir.path())
        .await
        .expect("should recreate vector store");
    store
        .add(&[record("9", vec![0.0, 0.0, 1.0], "only one")])
        .await
        .expect("should store record");

    assert_eq!(store.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn open_reads_existing_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut writer = VectorStore::create(temp_dir.path())
        .await
        .expect("should create vector store");
    writer
        .add(&sample_records())
        .await
        .expect("should store records");

    let reader = VectorStore::open(temp_dir.path())
        .await
        .expect("should open vector store");

    assert_eq!(reader.vector_dimension(), Some(3));
    assert_eq!(reader.count().await.expect("should count"), 3);
}

#[tokio::test]
async fn open_missing_directory_returns_no_results() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("never-ingested");

    let store = VectorStore::open(&dir)
        .await
        .expect("opening a missing index should succeed");
    let results = store
        .search(&[1.0, 0.0, 0.0], 4)
        .await
        .expect("search should succeed");

    assert!(results.is_empty());
    assert_eq!(store.count().await.expect("should count"), 0);
    assert!(!dir.exists(), "open must not create the directory");
}

#[tokio::test]
async fn open_directory_without_table_returns_no_results() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let store = VectorStore::open(temp_dir.path())
        .await
        .expect("should open vector store");
    let results = store
        .search(&[1.0, 0.0, 0.0], 4)
        .await
        .expect("search should succeed");

    assert!(results.is_empty());
}

#[tokio::test]
async fn relative_directory_is_resolved_against_working_directory() {
    let temp_dir = TempDir::new_in(".").expect("should create temp dir in working directory");
    let relative = PathBuf::from(
        temp_dir
            .path()
            .file_name()
            .expect("temp dir should have a name"),
    )
    .join("db");
    assert!(relative.is_relative());

    let mut store = VectorStore::create(&relative)
        .await
        .expect("should create vector store");
    store
        .add(&sample_records())
        .await
        .expect("should store records");

    assert!(temp_dir.path().join("db").join("chunks.lance").is_dir());
    assert!(!Path::new("file:").exists());

    let reopened = VectorStore::open(&relative)
        .await
        .expect("should open vector store");
    assert_eq!(reopened.count().await.expect("should count"), 3);
    assert_eq!(reopened.path(), relative.as_path());
}
