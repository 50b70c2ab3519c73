// Retriever module
// Turns a question into the chunks handed to the answer prompt


use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::config::RetrieverConfig;
use crate::database::{SearchResult, VectorStore};
use crate::embeddings::Embedder;
use crate::gate::cosine_similarity;

/// How the retriever ranks candidate chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Top-k by cosine similarity
    Similarity,
    /// Maximal marginal relevance over a larger candidate set
    Mmr,
}

/// A chunk returned to the chain
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: Map<String, Value>,
    pub similarity: f32,
}

impl From<SearchResult> for RetrievedChunk {
    #[inline]
    fn from(result: SearchResult) -> Self {
        Self {
            content: result.content,
            metadata: result.metadata,
            similarity: result.similarity_score,
        }
    }
}

#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>>;
}

/// Retriever over the persisted vector index
pub struct VectorStoreRetriever {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    config: RetrieverConfig,
}

impl std::fmt::Debug for VectorStoreRetriever {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreRetriever")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VectorStoreRetriever {
    #[inline]
    pub fn new(store: VectorStore, embedder: Arc<dyn Embedder>, config: RetrieverConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }
}

#[async_trait]
impl DocumentRetriever for VectorStoreRetriever {
    async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        let query = self.embedder.embed_query(question).await?;

        let chunks: Vec<RetrievedChunk> = match self.config.search_type {
            SearchType::Similarity => self
                .store
                .search(&query, self.config.k)
                .await?
                .into_iter()
                .map(RetrievedChunk::from)
                .collect(),
            SearchType::Mmr => {
                let candidates = self.store.search(&query, self.config.fetch_k).await?;
                max_marginal_relevance(&query, candidates, self.config.k, self.config.lambda_mult)
                    .into_iter()
                    .map(RetrievedChunk::from)
                    .collect()
            }
        };

        debug!(
            "Retrieved {} chunks using {:?} search",
            chunks.len(),
            self.config.search_type
        );
        Ok(chunks)
    }
}

/// Select `k` candidates balancing relevance to `query` against redundancy with earlier picks
///
/// Each step picks the candidate maximising
/// `lambda * sim(query, c) - (1 - lambda) * max(sim(c, s) for s in selected)`.
/// Ties keep the earlier (more similar) candidate.
#[inline]
pub fn max_marginal_relevance(
    query: &[f32],
    candidates: Vec<SearchResult>,
    k: usize,
    lambda: f32,
) -> Vec<SearchResult> {
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, &c.vector))
        .collect();

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_position = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (position, &candidate) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&chosen| {
                    cosine_similarity(&candidates[candidate].vector, &candidates[chosen].vector)
                })
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let score = lambda.mul_add(relevance[candidate], -(1.0 - lambda) * redundancy);
            if score > best_score {
                best_score = score;
                best_position = position;
            }
        }

        selected.push(remaining.remove(best_position));
    }

    let mut slots: Vec<Option<SearchResult>> = candidates.into_iter().map(Some).collect();
    selected
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}
