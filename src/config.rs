//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. [`load_config`] parses and validates in one step; the rest of the
//! crate can assume a loaded [`Config`] is consistent.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use vdir_core::density::{DensityClusterer, DistanceMetric};
use vdir_core::engine::Engine;
use vdir_core::merge::HierarchicalMerger;
use vdir_core::resolve::UnassignedPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
    #[serde(default)]
    pub labeling: LabelingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// `jsonl` or `qdrant`.
    #[serde(default = "default_source")]
    pub source: String,
    /// JSONL file, one chunk record per line.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Env var holding the Qdrant API key. Unset means no key is sent.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_text_field")]
    pub text_field: String,
    #[serde(default = "default_corpus_timeout")]
    pub timeout_secs: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            path: None,
            url: default_qdrant_url(),
            collection: default_collection(),
            api_key_env: None,
            batch_size: default_batch_size(),
            text_field: default_text_field(),
            timeout_secs: default_corpus_timeout(),
        }
    }
}

fn default_source() -> String {
    "jsonl".to_string()
}
fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "documents".to_string()
}
fn default_batch_size() -> usize {
    1000
}
fn default_text_field() -> String {
    "text".to_string()
}
fn default_corpus_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusteringConfig {
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    #[serde(default)]
    pub min_samples: Option<usize>,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub allow_single_cluster: bool,
    #[serde(default)]
    pub unassigned: UnassignedPolicy,
    #[serde(default = "default_miscellaneous_name")]
    pub miscellaneous_name: String,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: default_min_cluster_size(),
            min_samples: None,
            metric: DistanceMetric::default(),
            allow_single_cluster: false,
            unassigned: UnassignedPolicy::default(),
            miscellaneous_name: default_miscellaneous_name(),
        }
    }
}

fn default_min_cluster_size() -> usize {
    2
}
fn default_miscellaneous_name() -> String {
    "Unclassified".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HierarchyConfig {
    #[serde(default = "default_target_ratio")]
    pub target_ratio: f64,
    #[serde(default = "default_min_target")]
    pub min_target: usize,
    #[serde(default = "default_root_name")]
    pub root_name: String,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            target_ratio: default_target_ratio(),
            min_target: default_min_target(),
            root_name: default_root_name(),
        }
    }
}

fn default_target_ratio() -> f64 {
    0.3
}
fn default_min_target() -> usize {
    2
}
fn default_root_name() -> String {
    "AI Virtual Directory".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LabelingConfig {
    /// `disabled`, `keywords` or `openai`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_representatives")]
    pub representatives: usize,
    #[serde(default = "default_labeling_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_openai_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            representatives: default_representatives(),
            timeout_secs: default_labeling_timeout(),
            model: None,
            url: default_openai_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_provider() -> String {
    "keywords".to_string()
}
fn default_representatives() -> usize {
    5
}
fn default_labeling_timeout() -> u64 {
    120
}
fn default_openai_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

impl Config {
    /// Engine wired with this config's clustering and hierarchy policy.
    pub fn engine(&self) -> Engine {
        let c = &self.clustering;
        let clusterer = DensityClusterer::new(c.min_cluster_size)
            .with_min_samples(c.min_samples)
            .with_metric(c.metric)
            .with_allow_single_cluster(c.allow_single_cluster);
        let merger = HierarchicalMerger::new()
            .with_target_ratio(self.hierarchy.target_ratio)
            .with_min_target(self.hierarchy.min_target);
        Engine::new(clusterer, merger)
            .with_unassigned(c.unassigned, c.miscellaneous_name.clone())
            .with_root_name(self.hierarchy.root_name.clone())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Corpus
    match config.corpus.source.as_str() {
        "jsonl" => {
            if config.corpus.path.is_none() {
                bail!("corpus.path must be set when source is 'jsonl'");
            }
        }
        "qdrant" => {
            if config.corpus.collection.trim().is_empty() {
                bail!("corpus.collection must not be empty");
            }
        }
        other => bail!("Unknown corpus source: '{}'. Must be jsonl or qdrant.", other),
    }
    if config.corpus.batch_size == 0 {
        bail!("corpus.batch_size must be >= 1");
    }

    // Clustering
    if config.clustering.min_cluster_size < 2 {
        bail!("clustering.min_cluster_size must be >= 2");
    }
    if config.clustering.min_samples == Some(0) {
        bail!("clustering.min_samples must be >= 1");
    }

    // Hierarchy
    let ratio = config.hierarchy.target_ratio;
    if !(ratio > 0.0 && ratio <= 1.0) {
        bail!("hierarchy.target_ratio must be in (0.0, 1.0]");
    }
    if config.hierarchy.min_target < 2 {
        bail!("hierarchy.min_target must be >= 2");
    }
    let root = config.hierarchy.root_name.trim();
    let bucket = config.clustering.miscellaneous_name.trim();
    if root.is_empty() || bucket.is_empty() {
        bail!("hierarchy.root_name and clustering.miscellaneous_name must not be empty");
    }
    if root == bucket {
        bail!("hierarchy.root_name and clustering.miscellaneous_name must differ");
    }

    // Labeling
    match config.labeling.provider.as_str() {
        "disabled" | "keywords" => {}
        "openai" => {
            if config.labeling.model.is_none() {
                bail!("labeling.model must be specified when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown labeling provider: '{}'. Must be disabled, keywords, or openai.",
            other
        ),
    }
    if config.labeling.representatives == 0 {
        bail!("labeling.representatives must be >= 1");
    }

    Ok(())
}
