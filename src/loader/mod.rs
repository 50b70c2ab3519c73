
use anyhow::{Context, Result, anyhow};
use fancy_regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use ureq::Agent;

use crate::config::LoaderTimeout;

/// Elements whose text never reaches the document
const SKIPPED_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Elements that start on a new line in the extracted text
const BLOCK_TAGS: [&str; 22] = [
    "address",
    "article",
    "aside",
    "blockquote",
    "br",
    "dd",
    "div",
    "dl",
    "dt",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "li",
    "p",
    "pre",
    "section",
    "tr",
];

static TRAILING_WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r]+\n").expect("valid regex"));

static BLANK_LINES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// A unit of ingested text with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    #[inline]
    pub fn new(page_content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    #[inline]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

/// Configuration for fetching source pages
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string to use for requests
    pub user_agent: String,
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Time allowed to receive the response and body
    pub read_timeout: Duration,
    /// Maximum number of retry attempts for retryable errors
    pub max_retries: u32,
    /// Delay between retry attempts
    pub retry_delay: Duration,
}

impl Default for LoaderConfig {
    #[inline]
    fn default() -> Self {
        Self {
            user_agent: concat!("rag-gate/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl LoaderConfig {
    #[inline]
    pub fn from_timeout(timeout: LoaderTimeout) -> Self {
        Self {
            connect_timeout: timeout.connect(),
            read_timeout: timeout.read(),
            ..Self::default()
        }
    }
}

/// Fetches web pages and turns them into plain-text documents
#[derive(Debug, Clone)]
pub struct WebLoader {
    agent: Agent,
    config: LoaderConfig,
}

impl WebLoader {
    #[inline]
    pub fn new(config: LoaderConfig) -> Self {
        let agent = Agent::config_builder()
            .timeout_connect(Some(config.connect_timeout))
            .timeout_recv_response(Some(config.read_timeout))
            .timeout_recv_body(Some(config.read_timeout))
            .user_agent(&config.user_agent)
            .build()
            .into();

        Self { agent, config }
    }

    /// Load every URL in order. The first failure aborts the whole load.
    #[inline]
    pub async fn load(&self, urls: &[String]) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(urls.len());

        for url in urls {
            let html = self
                .fetch(url)
                .await
                .with_context(|| format!("Failed to load {}", url))?;
            let document = html_to_document(&html, url);
            debug!(
                "Loaded {} ({} characters)",
                url,
                document.page_content.chars().count()
            );
            documents.push(document);
        }

        info!("Loaded {} web documents", documents.len());
        Ok(documents)
    }

    /// Perform an HTTP GET request with retry logic
    #[inline]
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!("Retrying request to {} (attempt {})", url, attempt + 1);
                tokio::time::sleep(self.config.retry_delay).await;
            }

            let agent = self.agent.clone();
            let target = url.to_string();
            let outcome = tokio::task::spawn_blocking(move || try_get(&agent, &target))
                .await
                .context("Fetch task failed")?;

            match outcome {
                Ok(body) => {
                    debug!("Successfully fetched {} (attempt {})", url, attempt + 1);
                    return Ok(body);
                }
                Err(e) if is_retryable_error(&e) && attempt < self.config.max_retries => {
                    warn!("Retryable error for {}: {}", url, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("Request to {} failed: {}", url, e);
                    return Err(anyhow!("HTTP request to {} failed: {}", url, e));
                }
            }
        }

        Err(last_error.map_or_else(
            || anyhow!("All retry attempts failed"),
            |e| anyhow!("HTTP request to {} failed: {}", url, e),
        ))
    }
}

/// Attempt a single HTTP GET request without retry logic
fn try_get(agent: &Agent, url: &str) -> Result<String, ureq::Error> {
    debug!("Making HTTP GET request to: {}", url);
    let mut response = agent.get(url).call()?;
    let text = response.body_mut().read_to_string()?;
    debug!("Read {} bytes from {}", text.len(), url);
    Ok(text)
}

/// Timeouts, connection failures and 5xx responses are worth another attempt
fn is_retryable_error(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

/// Convert an HTML page into a document with `source`, `title`, `description` and `language` metadata
#[inline]
pub fn html_to_document(html: &str, url: &str) -> Document {
    let page = Html::parse_document(html);

    let mut metadata = Map::new();
    metadata.insert("source".to_string(), Value::String(url.to_string()));

    if let Some(title) = select_text(&page, "title") {
        metadata.insert("title".to_string(), Value::String(title));
    }
    if let Some(description) = select_attr(&page, r#"meta[name="description"]"#, "content") {
        metadata.insert("description".to_string(), Value::String(description));
    }
    if let Some(language) = select_attr(&page, "html", "lang") {
        metadata.insert("language".to_string(), Value::String(language));
    }

    Document::new(extract_text(&page), metadata)
}

fn select_text(page: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let text: String = page.select(&selector).next()?.text().collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn select_attr(page: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let value = page.select(&selector).next()?.value().attr(attr)?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Visible text of the page body, one line per block element
fn extract_text(page: &Html) -> String {
    let root = Selector::parse("body")
        .ok()
        .and_then(|body| page.select(&body).next())
        .unwrap_or_else(|| page.root_element());

    let mut text = String::new();
    for node in root.descendants() {
        if let Some(element) = node.value().as_element() {
            if BLOCK_TAGS.contains(&element.name()) {
                text.push('\n');
            }
            continue;
        }

        let Some(fragment) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| SKIPPED_TAGS.contains(&e.name()))
        });
        if !hidden {
            text.push_str(fragment);
        }
    }

    normalize_whitespace(&text)
}

fn normalize_whitespace(text: &str) -> String {
    let text = TRAILING_WHITESPACE_REGEX.replace_all(text, "\n");
    let text = BLANK_LINES_REGEX.replace_all(&text, "\n\n");
    text.trim().to_string()
}
