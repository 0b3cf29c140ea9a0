//! Vector corpus sources.
//!
//! A source delivers the full chunk snapshot for one run. Two are built in:
//!
//! - **[`JsonlSource`]**: one [`ChunkRecord`] JSON object per line.
//! - **[`QdrantSource`]**: pages through a Qdrant collection with the REST
//!   scroll API, reading vectors and the `doc_id`, `page`, `chunk_index`
//!   and text payload fields.
//!
//! Any source failure aborts the run before the store is touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use vdir_core::models::{ChunkRecord, VectorCorpus};

use crate::config::CorpusConfig;

#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    async fn load(&self) -> Result<VectorCorpus>;
}

/// Build the configured source. `path_override` replaces `corpus.path` and
/// forces the JSONL source.
pub fn create_source(
    config: &CorpusConfig,
    path_override: Option<&Path>,
) -> Result<Box<dyn CorpusSource>> {
    if let Some(path) = path_override {
        return Ok(Box::new(JsonlSource::new(path)));
    }
    match config.source.as_str() {
        "jsonl" => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow!("corpus.path required for the jsonl source"))?;
            Ok(Box::new(JsonlSource::new(path)))
        }
        "qdrant" => Ok(Box::new(QdrantSource::new(config)?)),
        other => bail!("Unknown corpus source: {}", other),
    }
}

// ============ JSONL ============

pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Parse JSONL text into records. Blank lines are skipped.
pub fn parse_jsonl(content: &str) -> Result<Vec<ChunkRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<ChunkRecord>(line)
                .with_context(|| format!("Invalid chunk record on line {}", i + 1))
        })
        .collect()
}

#[async_trait]
impl CorpusSource for JsonlSource {
    fn describe(&self) -> String {
        format!("jsonl:{}", self.path.display())
    }

    async fn load(&self) -> Result<VectorCorpus> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read corpus file: {}", self.path.display()))?;
        let records = parse_jsonl(&content)?;
        let corpus = VectorCorpus::new(records)?;
        info!(
            source = %self.describe(),
            chunks = corpus.len(),
            files = corpus.file_count(),
            dims = corpus.dims(),
            "corpus loaded"
        );
        Ok(corpus)
    }
}

// ============ Qdrant ============

pub struct QdrantSource {
    client: reqwest::Client,
    url: String,
    collection: String,
    batch_size: usize,
    text_field: String,
}

impl QdrantSource {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        anyhow::ensure!(
            config.url.starts_with("http://") || config.url.starts_with("https://"),
            "corpus.url must be an http(s) URL"
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(var) = &config.api_key_env {
            match std::env::var(var) {
                Ok(key) if !key.trim().is_empty() => {
                    headers.insert(
                        "api-key",
                        HeaderValue::from_str(key.trim()).context("invalid Qdrant API key")?,
                    );
                }
                _ => warn!(env = %var, "Qdrant API key variable not set; connecting without a key"),
            }
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build Qdrant HTTP client")?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            batch_size: config.batch_size.max(1),
            text_field: config.text_field.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    #[serde(default)]
    points: Vec<ScrollPoint>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ScrollPoint {
    id: Value,
    #[serde(default)]
    payload: serde_json::Map<String, Value>,
    #[serde(default)]
    vector: Option<Value>,
}

/// Unnamed vectors come back as an array, named ones as `{name: array}`.
fn vector_of(value: &Value) -> Option<Vec<f32>> {
    let array = match value {
        Value::Array(a) => a,
        Value::Object(map) => map.values().find_map(Value::as_array)?,
        _ => return None,
    };
    array.iter().map(|x| x.as_f64().map(|f| f as f32)).collect()
}

/// Convert one scroll page into records. Points without a vector or `doc_id`
/// are skipped with a warning.
fn records_from_page(points: Vec<ScrollPoint>, text_field: &str) -> Vec<ChunkRecord> {
    points
        .into_iter()
        .filter_map(|p| {
            let Some(vector) = p.vector.as_ref().and_then(vector_of) else {
                warn!(id = %p.id, "point has no vector; skipped");
                return None;
            };
            let Some(doc_id) = p.payload.get("doc_id").and_then(Value::as_str) else {
                warn!(id = %p.id, "point has no doc_id payload; skipped");
                return None;
            };
            Some(ChunkRecord {
                doc_id: doc_id.to_string(),
                vector,
                page: p.payload.get("page").and_then(Value::as_i64).unwrap_or(0),
                chunk_index: p
                    .payload
                    .get("chunk_index")
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
                text: p
                    .payload
                    .get(text_field)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl CorpusSource for QdrantSource {
    fn describe(&self) -> String {
        format!("qdrant:{}/{}", self.url, self.collection)
    }

    async fn load(&self) -> Result<VectorCorpus> {
        let endpoint = format!("{}/collections/{}/points/scroll", self.url, self.collection);
        let mut records = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = serde_json::json!({
                "limit": self.batch_size,
                "with_payload": true,
                "with_vector": true,
            });
            if let Some(o) = &offset {
                body["offset"] = o.clone();
            }

            let resp = self
                .client
                .post(&endpoint)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("Qdrant scroll request to {} failed", endpoint))?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                bail!("Qdrant scroll failed ({}): {}", status, text);
            }
            let page: ScrollResponse = resp
                .json()
                .await
                .context("failed to parse Qdrant scroll response")?;

            let fetched = page.result.points.len();
            records.extend(records_from_page(page.result.points, &self.text_field));
            debug!(fetched, total = records.len(), "scrolled page");

            match page.result.next_page_offset {
                Some(next) if !next.is_null() && fetched > 0 => offset = Some(next),
                _ => break,
            }
        }

        let corpus = VectorCorpus::new(records)?;
        info!(
            source = %self.describe(),
            chunks = corpus.len(),
            files = corpus.file_count(),
            "corpus loaded"
        );
        Ok(corpus)
    }
}
