/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: nestrag.toml (in working directory)
/// 3. Environment variables: prefixed NESTRAG_, nested with `__`
///    (e.g., NESTRAG_RETRIEVAL__TOP_N=5)

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::errors::NestragError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub context: ContextConfig,
}

/// Locations of the read-only inputs produced by the offline build jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
    pub products_path: PathBuf,
    /// Recipe detail records; absent for product-only deployments.
    #[serde(default)]
    pub recipes_path: Option<PathBuf>,
    pub graph_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            index_path: PathBuf::from("data/vector_index.json"),
            metadata_path: PathBuf::from("data/vector_metadata.json"),
            products_path: PathBuf::from("data/structured_product_data.json"),
            recipes_path: None,
            graph_path: PathBuf::from("data/product_graph.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" (fastembed), "openai", or "hashed"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// fastembed model cache directory
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Vector width for the hashed provider
    #[serde(default = "default_hashed_dimension")]
    pub hashed_dimension: usize,
}

fn default_embedding_provider() -> String {
    "local".to_string()
}

fn default_cache_dir() -> String {
    dirs::cache_dir()
        .map(|d| d.join("nestrag").join("fastembed"))
        .unwrap_or_else(|| PathBuf::from(".fastembed_cache"))
        .to_string_lossy()
        .into_owned()
}

fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_hashed_dimension() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: default_embedding_provider(),
            cache_dir: default_cache_dir(),
            openai_api_key: None,
            openai_model: default_openai_model(),
            hashed_dimension: default_hashed_dimension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Distinct entities returned per query
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Vector hits fetched before reranking and deduplication
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,

    /// "graph_boost" (default) or "lexical_hybrid"
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// "identity" (name + brand + category) or "chunk_text"
    #[serde(default = "default_lexical_corpus")]
    pub lexical_corpus: String,

    /// Grow the candidate pool when it holds fewer than top_n distinct entities
    #[serde(default = "default_widen_pool")]
    pub widen_pool: bool,

    /// Per-request deadline spanning embedding, search and graph lookups.
    /// None disables the deadline.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_top_n() -> usize {
    3
}

fn default_candidate_pool() -> usize {
    50
}

fn default_strategy() -> String {
    "graph_boost".to_string()
}

fn default_lexical_corpus() -> String {
    "identity".to_string()
}

fn default_widen_pool() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            top_n: default_top_n(),
            candidate_pool: default_candidate_pool(),
            strategy: default_strategy(),
            lexical_corpus: default_lexical_corpus(),
            widen_pool: default_widen_pool(),
            request_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Upper bound on the assembled context block, in characters
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_max_chars() -> usize {
    6000
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            max_chars: default_max_chars(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            data: DataConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: NESTRAG_EMBEDDING__PROVIDER=hashed overrides embedding.provider in nestrag.toml
    pub fn load() -> Result<Config, NestragError> {
        Self::figment()
            .extract()
            .map_err(|e| NestragError::Config(format!("Failed to load config: {}", e)))
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("nestrag.toml"))
            .merge(Env::prefixed("NESTRAG_").split("__"))
    }
}
