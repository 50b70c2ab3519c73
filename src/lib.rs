use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0} must be set")]
    MissingCredential(&'static str),

    #[error("Document loading error: {0}")]
    Loader(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chain;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod gate;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod openai;
pub mod qa;
pub mod retriever;
pub mod server;
