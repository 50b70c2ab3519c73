use console::style;
use std::sync::Arc;
use tracing::info;

use crate::Result;
use crate::config::{API_KEY_ENV, Config, api_key_from_env};
use crate::embeddings::OpenAiEmbeddings;
use crate::ingest::{IngestReport, Ingestor};
use crate::openai::OpenAiClient;

/// Build the vector index from the configured sources
///
/// The credential is checked before any network or disk work.
#[inline]
pub async fn ingest(config: &Config) -> Result<IngestReport> {
    let api_key = api_key_from_env()?;
    let client = OpenAiClient::new(&config.openai, api_key)?;
    let embedder = Arc::new(OpenAiEmbeddings::new(
        client,
        config.openai.embedding_model.clone(),
    ));

    let report = Ingestor::new(config, embedder).run().await?;
    info!("Ingestion finished: {:?}", report);

    eprintln!(
        "{} Vector DB built at {}",
        style("✓").green().bold(),
        style(report.persist_directory.display()).cyan()
    );
    eprintln!("  Documents: {}", style(report.documents).cyan());
    eprintln!("  Chunks: {}", style(report.chunks).cyan());
    eprintln!("  Vectors: {}", style(report.vectors).cyan());

    Ok(report)
}

/// Start the query service
#[inline]
pub async fn serve(config: &Config, host: &str, port: u16) -> Result<()> {
    crate::server::serve(config, host, port).await
}

/// Print the resolved configuration. The API key itself is never shown.
#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Sources:").bold().yellow());
    for url in &config.source_urls {
        eprintln!("  {}", style(url).cyan());
    }
    eprintln!(
        "  Extra documents: {}",
        style(config.extra_documents.len()).cyan()
    );
    eprintln!(
        "  Timeouts: connect {}s, read {}s",
        style(config.loader_timeout.0).cyan(),
        style(config.loader_timeout.1).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Allow list:").bold().yellow());
    for question in config.canonical_questions() {
        eprintln!("  {}", style(question).cyan());
    }
    eprintln!("  Threshold: {}", style(config.threshold).cyan());
    eprintln!("  Refusal: {}", style(&config.refusal_text).cyan());

    eprintln!();
    eprintln!("{}", style("Models:").bold().yellow());
    eprintln!(
        "  Chat: {} (temperature {})",
        style(&config.llm.model).cyan(),
        style(config.llm.temperature).cyan()
    );
    eprintln!(
        "  Embeddings: {}",
        style(&config.openai.embedding_model).cyan()
    );
    match config.openai.resolved_base_url() {
        Ok(url) => eprintln!("  API URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  API URL: {} ({})", style("Invalid").red(), e),
    }
    match api_key_from_env() {
        Ok(_) => eprintln!("  {}: {}", API_KEY_ENV, style("set").green()),
        Err(_) => eprintln!("  {}: {}", API_KEY_ENV, style("missing").red()),
    }

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  Search: {:?}, k {}, fetch_k {}, lambda {}",
        config.retriever.search_type,
        style(config.retriever.k).cyan(),
        style(config.retriever.fetch_k).cyan(),
        style(config.retriever.lambda_mult).cyan()
    );
    eprintln!(
        "  Chunking: size {}, overlap {}",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );
    eprintln!(
        "  Index: {}",
        style(config.persist_directory.display()).cyan()
    );
    eprintln!(
        "  Front-end: {}",
        style(config.server.frontend_dir.display()).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(Config::resolve_path().display()).dim()
    );
}
