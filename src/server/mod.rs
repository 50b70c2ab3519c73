// HTTP server
// LangServe-style `/chat` routes plus the static front-end

pub mod errors;
pub mod handlers;
pub mod protocol;


use axum::Router;
use axum::routing::post;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::chain::ConversationalRetrievalChain;
use crate::config::{Config, api_key_from_env};
use crate::database::VectorStore;
use crate::embeddings::{Embedder, OpenAiEmbeddings};
use crate::gate::AllowList;
use crate::llm::OpenAiChat;
use crate::openai::OpenAiClient;
use crate::qa::QaService;
use crate::retriever::VectorStoreRetriever;
use crate::{RagError, Result};

pub use errors::ApiError;

/// Shared, read-only request state
#[derive(Debug, Clone)]
pub struct AppState {
    pub qa: Arc<QaService>,
}

impl AppState {
    #[inline]
    pub fn new(qa: QaService) -> Self {
        Self { qa: Arc::new(qa) }
    }
}

/// Build the router: `/chat/{invoke,batch,stream}`, everything else served from `frontend_dir`
#[inline]
pub fn router(state: AppState, frontend_dir: &Path) -> Router {
    Router::new()
        .route("/chat/invoke", post(handlers::invoke))
        .route("/chat/batch", post(handlers::batch))
        .route("/chat/stream", post(handlers::stream))
        .fallback_service(ServeDir::new(frontend_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire the allow list, retriever and chain together from configuration
///
/// Embeds every canonical question once and opens the index read-only.
#[inline]
pub async fn build_service(config: &Config, api_key: String) -> Result<QaService> {
    let client = OpenAiClient::new(&config.openai, api_key)?;
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbeddings::new(
        client.clone(),
        config.openai.embedding_model.clone(),
    ));

    let allow_list = AllowList::build(
        embedder.as_ref(),
        config.canonical_questions(),
        config.threshold,
    )
    .await
    .map_err(|e| RagError::Embedding(format!("Failed to embed allow list: {:#}", e)))?;

    let store = VectorStore::open(&config.persist_directory).await?;
    let retriever = Arc::new(VectorStoreRetriever::new(
        store,
        Arc::clone(&embedder),
        config.retriever.clone(),
    ));
    let llm = Arc::new(OpenAiChat::new(client, &config.llm));
    let chain = Arc::new(ConversationalRetrievalChain::new(llm, retriever));

    Ok(QaService::new(
        allow_list,
        embedder,
        chain,
        config.refusal_text.clone(),
    ))
}

/// Serve `app` on `listener` until `shutdown` resolves
#[inline]
pub async fn serve_on<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RagError::Server(format!("Server error: {}", e)))
}

/// Run the query service until Ctrl-C or SIGTERM
#[inline]
pub async fn serve(config: &Config, host: &str, port: u16) -> Result<()> {
    let api_key = api_key_from_env()?;
    let qa = build_service(config, api_key).await?;
    let app = router(AppState::new(qa), &config.server.frontend_dir);

    let bind_addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| RagError::Server(format!("Failed to bind to {}: {}", bind_addr, e)))?;
    let addr = listener.local_addr()?;

    info!(
        "{} {} listening on http://{}",
        config.server.title.as_deref().unwrap_or("rag-gate"),
        config.server.version.as_deref().unwrap_or(env!("CARGO_PKG_VERSION")),
        addr
    );
    if let Some(description) = &config.server.description {
        info!("{}", description);
    }

    serve_on(listener, app, wait_for_signal()).await
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }

    info!("Shutting down gracefully");
}
