#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end ingestion against mocked web pages and a mocked embeddings API

use rag_gate::RagError;
use rag_gate::config::Config;
use rag_gate::database::VectorStore;
use rag_gate::embeddings::OpenAiEmbeddings;
use rag_gate::ingest::Ingestor;
use rag_gate::loader::{LoaderConfig, WebLoader};
use rag_gate::openai::OpenAiClient;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// Answers every embeddings request with one vector per input, keyed on topic words
fn embeddings_responder(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
    let data: Vec<Value> = body["input"]
        .as_array()
        .map(|inputs| {
            inputs
                .iter()
                .enumerate()
                .map(|(index, text)| {
                    let text = text.as_str().unwrap_or_default();
                    let vector = if text.contains("refund") {
                        vec![1.0, 0.0, 0.0]
                    } else if text.contains("shipping") {
                        vec![0.0, 1.0, 0.0]
                    } else {
                        vec![0.0, 0.0, 1.0]
                    };
                    json!({"object": "embedding", "index": index, "embedding": vector})
                })
                .collect()
        })
        .unwrap_or_default();

    ResponseTemplate::new(200).set_body_json(json!({
        "object": "list",
        "data": data,
        "model": "text-embedding-ada-002"
    }))
}

async fn start_api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(embeddings_responder)
        .mount(&server)
        .await;
    server
}

async fn serve_page(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

fn test_config(api: &MockServer, urls: Vec<String>, persist_directory: &Path) -> Config {
    let config: Config = serde_json::from_value(json!({
        "source_urls": urls,
        "loader_timeout": [2.0, 2.0],
        "canonical_allowed": {"refund policy": null},
        "threshold": 0.85,
        "refusal_text": "Sorry, I can only answer questions about refunds.",
        "llm": {"model": "gpt-test", "temperature": 0.0},
        "retriever": {"search_type": "similarity", "k": 2},
        "fastapi": {},
        "openai": {
            "base_url": format!("{}/v1", api.uri()),
            "batch_size": 2,
            "retry_attempts": 1
        },
        "persist_directory": persist_directory,
    }))
    .expect("test config should parse");
    config.validate().expect("test config should validate");
    config
}

fn ingestor(config: &Config) -> Ingestor {
    let client = OpenAiClient::new(&config.openai, "sk-test".to_string())
        .expect("client should build")
        .with_backoff_base(Duration::from_millis(10));
    let embedder = Arc::new(OpenAiEmbeddings::new(
        client,
        config.openai.embedding_model.clone(),
    ));
    Ingestor::new(config, embedder).with_loader(WebLoader::new(LoaderConfig {
        max_retries: 0,
        ..LoaderConfig::default()
    }))
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_builds_one_vector_per_chunk() {
    init_test_tracing();

    let api = start_api().await;
    let site = MockServer::start().await;
    serve_page(
        &site,
        "/refunds",
        format!(
            "<html><head><title>Refunds</title></head><body><p>{}</p></body></html>",
            "a".repeat(1000)
        ),
    )
    .await;
    serve_page(
        &site,
        "/shipping",
        "<html><body><h1>Shipping</h1><p>Orders ship within two days.</p></body></html>"
            .to_string(),
    )
    .await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let db = temp_dir.path().join("db");
    let config = test_config(
        &api,
        vec![
            format!("{}/refunds", site.uri()),
            format!("{}/shipping", site.uri()),
        ],
        &db,
    );

    let report = ingestor(&config).run().await.expect("ingest should succeed");

    assert_eq!(report.documents, 2);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.vectors, report.chunks);

    let store = VectorStore::open(&db).await.expect("index should open");
    assert_eq!(store.count().await.expect("count"), 3);
    assert_eq!(store.vector_dimension(), Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_source_aborts_without_writing_index() {
    init_test_tracing();

    let api = start_api().await;
    let site = MockServer::start().await;
    serve_page(&site, "/ok", "<p>refund details</p>".to_string()).await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let db = temp_dir.path().join("db");
    let config = test_config(
        &api,
        vec![
            format!("{}/ok", site.uri()),
            "http://127.0.0.1:1/unreachable".to_string(),
        ],
        &db,
    );

    let result = ingestor(&config).run().await;

    assert!(matches!(result, Err(RagError::Loader(_))));
    assert!(!db.exists());
    let embedding_calls = api
        .received_requests()
        .await
        .unwrap_or_default()
        .len();
    assert_eq!(embedding_calls, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn embeddings_api_failure_leaves_previous_index_untouched() {
    init_test_tracing();

    let site = MockServer::start().await;
    serve_page(&site, "/refunds", "<p>refund within 30 days</p>".to_string()).await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let db = temp_dir.path().join("db");

    let healthy = start_api().await;
    let config = test_config(&healthy, vec![format!("{}/refunds", site.uri())], &db);
    ingestor(&config).run().await.expect("first ingest should succeed");

    let failing = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&failing)
        .await;
    let config = test_config(&failing, vec![format!("{}/refunds", site.uri())], &db);

    let result = ingestor(&config).run().await;
    assert!(matches!(result, Err(RagError::Embedding(_))));

    let store = VectorStore::open(&db).await.expect("index should open");
    assert_eq!(store.count().await.expect("count"), 1);
}
