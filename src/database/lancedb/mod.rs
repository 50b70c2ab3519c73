// LanceDB vector database module
// Persists chunk embeddings and serves cosine similarity search

#[cfg(test)]
mod tests;

pub mod vector_store;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::embeddings::Chunk;

pub use vector_store::{SearchResult, VectorStore};

/// One embedded chunk as stored in the `chunks` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique identifier for this record
    pub id: String,
    /// The embedding of `content`
    pub vector: Vec<f32>,
    /// The chunk text
    pub content: String,
    /// URL or other origin of the source document, empty if unknown
    pub source: String,
    /// Source document metadata
    pub metadata: Map<String, Value>,
    /// Index of this chunk within its document
    pub chunk_index: u32,
    /// Timestamp when this record was created
    pub created_at: String,
}

impl ChunkRecord {
    #[inline]
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vector,
            source: chunk.source().unwrap_or_default().to_string(),
            content: chunk.content,
            metadata: chunk.metadata,
            chunk_index: u32::try_from(chunk.chunk_index).unwrap_or(u32::MAX),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
