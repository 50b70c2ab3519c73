// Embeddings module
// Embedding provider abstraction and document chunking

pub mod chunking;


use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::openai::OpenAiClient;

pub use chunking::{Chunk, ChunkingConfig, TextSplitter};

/// Turns text into fixed-dimension vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vector"))
    }
}

/// Embedder backed by the OpenAI embeddings endpoint
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbeddings {
    #[inline]
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embeddings = self.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            embeddings
                .client
                .create_embeddings(&embeddings.model, &texts)
        })
        .await
        .context("Embedding task failed")?
    }
}
