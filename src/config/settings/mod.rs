
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::RagError;
use crate::embeddings::chunking::ChunkingConfig;
use crate::loader::Document;
use crate::retriever::SearchType;

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
/// Environment variable holding the provider credential
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable that overrides the provider base URL
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

const DEFAULT_CONFIG_FILE: &str = "config.json";
const ENV_FILE: &str = ".env";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub source_urls: Vec<String>,
    pub loader_timeout: LoaderTimeout,
    #[serde(default)]
    pub extra_documents: Vec<Document>,
    /// Canonical in-scope questions; the values are carried but never read
    pub canonical_allowed: BTreeMap<String, serde_json::Value>,
    pub threshold: f32,
    pub refusal_text: String,
    pub llm: LlmConfig,
    pub retriever: RetrieverConfig,
    #[serde(rename = "fastapi")]
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub openai: OpenAiSettings,
    #[serde(default = "default_persist_directory")]
    pub persist_directory: PathBuf,
}

/// `[connect, read]` timeouts in seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LoaderTimeout(pub f64, pub f64);

impl LoaderTimeout {
    #[inline]
    pub fn connect(&self) -> Duration {
        Duration::from_secs_f64(self.0)
    }

    #[inline]
    pub fn read(&self) -> Duration {
        Duration::from_secs_f64(self.1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrieverConfig {
    pub search_type: SearchType,
    pub k: usize,
    /// Candidate pool size for MMR
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    /// Relevance/diversity trade-off for MMR (1.0 = pure relevance)
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub title: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub frontend_dir: PathBuf,
}

impl Default for ServerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            version: None,
            frontend_dir: PathBuf::from("ui"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiSettings {
    pub base_url: Option<String>,
    pub embedding_model: String,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub batch_size: usize,
}

impl Default for OpenAiSettings {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout_seconds: 60,
            retry_attempts: 3,
            batch_size: 100,
        }
    }
}

fn default_persist_directory() -> PathBuf {
    PathBuf::from("db")
}

const fn default_fetch_k() -> usize {
    20
}

const fn default_lambda_mult() -> f32 {
    0.5
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid loader timeout: {0}s (must be positive)")]
    InvalidTimeout(f64),
    #[error("Invalid threshold: {0} (must be between -1 and 1)")]
    InvalidThreshold(f32),
    #[error("canonical_allowed must contain at least one entry")]
    EmptyAllowList,
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid temperature: {0} (must be between 0 and 2)")]
    InvalidTemperature(f32),
    #[error("Invalid retriever k: {0} (must be at least 1)")]
    InvalidK(usize),
    #[error("Retriever fetch_k ({0}) must be at least k ({1})")]
    FetchKTooSmall(usize, usize),
    #[error("Invalid lambda_mult: {0} (must be between 0 and 1)")]
    InvalidLambda(f32),
    #[error("Invalid chunk size: {0} (must be at least 1)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid request timeout: {0}s (must be between 1 and 600)")]
    InvalidRequestTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid embedding batch size: {0} (must be between 1 and 2048)")]
    InvalidBatchSize(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    /// Load the configuration from `CONFIG_PATH` or `./config.json`
    #[inline]
    pub fn load() -> crate::Result<Self> {
        Self::load_from(Self::resolve_path())
    }

    /// Read, parse and validate a config file. Any failure is a `RagError::Config`.
    #[inline]
    pub fn load_from<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        Self::read_validated(path.as_ref()).map_err(|e| RagError::Config(format!("{:#}", e)))
    }

    fn read_validated(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn resolve_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .filter(|p| !p.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for url in &self.source_urls {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        }

        for secs in [self.loader_timeout.0, self.loader_timeout.1] {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(ConfigError::InvalidTimeout(secs));
            }
        }

        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }

        if self.canonical_allowed.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }

        self.llm.validate()?;
        self.retriever.validate()?;
        self.validate_chunking_config()?;
        self.openai.validate()?;
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if config.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    /// Canonical allowed questions in lexicographic order
    #[inline]
    pub fn canonical_questions(&self) -> Vec<String> {
        self.canonical_allowed.keys().cloned().collect()
    }
}

impl LlmConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        Ok(())
    }
}

impl RetrieverConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::InvalidK(self.k));
        }

        if self.fetch_k < self.k {
            return Err(ConfigError::FetchKTooSmall(self.fetch_k, self.k));
        }

        if !(0.0..=1.0).contains(&self.lambda_mult) {
            return Err(ConfigError::InvalidLambda(self.lambda_mult));
        }

        Ok(())
    }
}

impl OpenAiSettings {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidRequestTimeout(self.timeout_seconds));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        if !(1..=2048).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if let Some(base_url) = &self.base_url {
            Url::parse(base_url).map_err(|_| ConfigError::InvalidUrl(base_url.clone()))?;
        }

        Ok(())
    }

    /// Resolve the API base URL: config value, then `OPENAI_BASE_URL`, then the public endpoint.
    /// The result always ends in `/` so relative joins keep the version segment.
    #[inline]
    pub fn resolved_base_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .base_url
            .clone()
            .or_else(|| std::env::var(BASE_URL_ENV).ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let normalized = if raw.ends_with('/') {
            raw
        } else {
            format!("{}/", raw)
        };

        Url::parse(&normalized).map_err(|_| ConfigError::InvalidUrl(normalized))
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Read the provider credential, failing fast when it is absent
#[inline]
pub fn api_key_from_env() -> crate::Result<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(RagError::MissingCredential(API_KEY_ENV)),
    }
}

/// Load `./.env` if present; variables already in the environment take precedence
#[inline]
pub fn load_env_file() {
    load_env_file_from(Path::new(ENV_FILE));
}

/// Load the given env file without searching parent directories
#[inline]
pub fn load_env_file_from(path: &Path) {
    match dotenvy::from_path(path) {
        Ok(()) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    }
}
