// Database module
// Vector index persisted with LanceDB

pub mod lancedb;

pub use self::lancedb::{ChunkRecord, SearchResult, VectorStore};
