//! Label providers.
//!
//! Implementations of [`LabelOracle`] selected by `labeling.provider`:
//! - **`keywords`**: offline. The two most frequent non-stopword terms of
//!   the representative texts, title cased.
//! - **`openai`**: any OpenAI-compatible chat-completions endpoint. One
//!   request per node, bounded by `timeout_secs`, never retried; a failure
//!   leaves the node with its placeholder name.
//! - **`disabled`**: no provider; every node keeps its placeholder name.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use vdir_core::labeling::LabelOracle;

use crate::config::LabelingConfig;

/// Build the configured oracle. `None` means labeling is disabled.
pub fn create_labeler(config: &LabelingConfig) -> Result<Option<Box<dyn LabelOracle>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "keywords" => Ok(Some(Box::new(KeywordLabeler::new()))),
        "openai" => Ok(Some(Box::new(OpenAILabeler::new(config)?))),
        other => bail!("Unknown labeling provider: {}", other),
    }
}

// ============ Keywords ============

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "and", "are", "because", "been", "before", "being", "between",
    "both", "but", "can", "could", "does", "each", "for", "from", "had", "has", "have", "how",
    "into", "its", "may", "more", "most", "not", "one", "only", "other", "our", "over", "should",
    "some", "such", "than", "that", "the", "their", "them", "then", "there", "these", "they",
    "this", "those", "through", "two", "under", "use", "used", "using", "very", "was", "were",
    "what", "when", "where", "which", "while", "who", "will", "with", "would", "you", "your",
];

/// Frequency-based offline namer.
pub struct KeywordLabeler {
    terms: usize,
}

impl KeywordLabeler {
    pub fn new() -> Self {
        Self { terms: 2 }
    }
}

impl Default for KeywordLabeler {
    fn default() -> Self {
        Self::new()
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Most frequent terms, ties alphabetical.
pub fn top_terms(texts: &[String], n: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            let token = token.to_lowercase();
            if token.chars().count() < 3
                || token.chars().all(|c| c.is_ascii_digit())
                || STOPWORDS.contains(&token.as_str())
            {
                continue;
            }
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(n).map(|(t, _)| t).collect()
}

#[async_trait]
impl LabelOracle for KeywordLabeler {
    fn name(&self) -> &str {
        "keywords"
    }

    async fn label(&self, texts: &[String]) -> Result<String> {
        let terms = top_terms(texts, self.terms);
        if terms.is_empty() {
            bail!("no usable terms in representative texts");
        }
        Ok(terms.iter().map(|t| title_case(t)).collect::<Vec<_>>().join(" "))
    }
}

// ============ OpenAI-compatible chat ============

const SYSTEM_PROMPT: &str = "You name folders in a document library. \
Given excerpts from related documents, reply with one short category name \
of two to four words and nothing else.";

pub struct OpenAILabeler {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAILabeler {
    /// # Errors
    ///
    /// Returns an error if `model` is not set or the HTTP client cannot be built.
    pub fn new(config: &LabelingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("labeling.model required for the openai provider"))?;
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .filter(|k| !k.trim().is_empty());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model,
            api_key,
        })
    }

    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        let excerpts = texts
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {}", i + 1, t))
            .collect::<Vec<_>>()
            .join("\n");
        serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": excerpts},
            ],
        })
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid chat response: missing choices[0].message.content"))
}

#[async_trait]
impl LabelOracle for OpenAILabeler {
    fn name(&self) -> &str {
        "openai"
    }

    async fn label(&self, texts: &[String]) -> Result<String> {
        let mut request = self.client.post(&self.url).json(&self.request_body(texts));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat API error {}: {}", status, body_text);
        }
        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}
