// Ingestion job
// Fetch sources, split, embed, and only then write a fresh vector index


use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{ChunkRecord, VectorStore};
use crate::embeddings::{Chunk, Embedder, TextSplitter};
use crate::loader::{Document, LoaderConfig, WebLoader};
use crate::{RagError, Result};

/// Summary of a completed ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub vectors: usize,
    pub persist_directory: PathBuf,
}

/// Builds the vector index from the configured sources
pub struct Ingestor {
    loader: WebLoader,
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    source_urls: Vec<String>,
    extra_documents: Vec<Document>,
    persist_directory: PathBuf,
    batch_size: usize,
}

impl std::fmt::Debug for Ingestor {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("source_urls", &self.source_urls)
            .field("extra_documents", &self.extra_documents.len())
            .field("persist_directory", &self.persist_directory)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Ingestor {
    #[inline]
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            loader: WebLoader::new(LoaderConfig::from_timeout(config.loader_timeout)),
            splitter: TextSplitter::new(config.chunking),
            embedder,
            source_urls: config.source_urls.clone(),
            extra_documents: config.extra_documents.clone(),
            persist_directory: config.persist_directory.clone(),
            batch_size: config.openai.batch_size.max(1),
        }
    }

    /// Replace the web loader, e.g. to change retry behaviour
    #[inline]
    #[must_use]
    pub fn with_loader(mut self, loader: WebLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Run the whole job. Nothing is written to disk unless every step before it succeeded.
    #[inline]
    pub async fn run(&self) -> Result<IngestReport> {
        info!("Loading {} source URLs", self.source_urls.len());
        let mut documents = self
            .loader
            .load(&self.source_urls)
            .await
            .map_err(|e| RagError::Loader(format!("{:#}", e)))?;

        documents.extend(self.extra_documents.iter().cloned());
        info!(
            "Loaded {} documents ({} extra)",
            documents.len(),
            self.extra_documents.len()
        );

        let chunks = self.splitter.split_documents(&documents);
        info!("Split documents into {} chunks", chunks.len());

        let vectors = self.embed_chunks(&chunks).await?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord::from_chunk(chunk, vector))
            .collect();

        let mut store = VectorStore::create(&self.persist_directory).await?;
        store.add(&records).await?;
        let stored = store.count().await?;

        info!(
            "Vector index written to {} with {} vectors",
            self.persist_directory.display(),
            stored
        );

        Ok(IngestReport {
            documents: documents.len(),
            chunks: records.len(),
            vectors: stored,
            persist_directory: self.persist_directory.clone(),
        })
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = self
                .embedder
                .embed_documents(&texts)
                .await
                .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

            if embedded.len() != texts.len() {
                bar.abandon();
                return Err(RagError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    embedded.len()
                )));
            }

            debug!("Embedded batch of {} chunks", texts.len());
            vectors.extend(embedded);
            bar.inc(batch.len() as u64);
        }

        bar.finish_and_clear();
        Ok(vectors)
    }
}
