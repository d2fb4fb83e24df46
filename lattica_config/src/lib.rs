//! # Lattica Config
//!
//! Configuration system for the Lattica retrieval engine.
//!
//! Provides TOML-based configuration parsing and validation for the server,
//! the graph/vector/cache stores, the external collaborators (NER, embedding,
//! LLM), and the ingestion/retrieval/reasoning pipelines.
//!
//! # Configuration Schema
//!
//! The configuration file (`lattica.toml`) supports the following sections:
//! - `[server]` — HTTP server settings (host, port, log_level, log_format)
//! - `[stores]` — store mode and service URLs
//! - `[collaborators]` — NER/embedding/LLM collaborator endpoints
//! - `[ingestion]` — chunking and extraction pipeline settings
//! - `[retrieval]` — retrieval deadlines and result sizing
//! - `[reasoning]` — reasoning path settings, including the causal edge set
//! - `[cache]` — retrieval cache TTL
//!
//! # Environment Variable Overrides
//!
//! Selected fields can be overridden via environment variables using the
//! `LATTICA_` prefix and `_` as section separator:
//! - `LATTICA_SERVER_HOST` → `server.host`
//! - `LATTICA_SERVER_PORT` → `server.port`
//! - `LATTICA_SERVER_LOG_LEVEL` → `server.log_level`
//! - `LATTICA_STORES_MODE` → `stores.mode`
//! - `LATTICA_STORES_GRAPH_URL` → `stores.graph_url`
//! - `LATTICA_STORES_VECTOR_URL` → `stores.vector_url`
//! - `LATTICA_STORES_CACHE_URL` → `stores.cache_url`
//! - `LATTICA_COLLABORATORS_NER_URL` → `collaborators.ner_url`
//! - `LATTICA_COLLABORATORS_EMBEDDING_URL` → `collaborators.embedding_url`
//! - `LATTICA_COLLABORATORS_LLM_URL` → `collaborators.llm_url`
//! - `LATTICA_COLLABORATORS_LLM_API_KEY` → `collaborators.llm_api_key`
//! - `LATTICA_DISABLE_LLM_FALLBACK` → `collaborators.disable_llm_fallback`

use serde::{Deserialize, Serialize};

/// Top-level Lattica configuration.
///
/// Parsed from `lattica.toml` or constructed programmatically. Environment
/// variables with the `LATTICA_` prefix override TOML values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatticaConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Store selection and service URLs.
    #[serde(default)]
    pub stores: StoresConfig,
    /// External collaborator endpoints.
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
    /// Ingestion pipeline settings.
    #[serde(default)]
    pub ingestion: IngestionSettings,
    /// Retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    /// Reasoning settings.
    #[serde(default)]
    pub reasoning: ReasoningSettings,
    /// Retrieval cache settings.
    #[serde(default)]
    pub cache: CacheSettings,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP port (default: 8410).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level (default: "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format: "text" (default) or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8410
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

/// Store selection and service URLs.
///
/// In `embedded` mode (default) the engine runs on its in-memory reference
/// backends. In `external` mode the configured graph and vector services are
/// used instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresConfig {
    /// Store mode: "embedded" (default) or "external".
    #[serde(default = "default_store_mode")]
    pub mode: String,
    /// Graph store URL (external mode).
    #[serde(default)]
    pub graph_url: Option<String>,
    /// Graph store user (external mode).
    #[serde(default)]
    pub graph_user: Option<String>,
    /// Graph store password (external mode).
    #[serde(default)]
    pub graph_password: Option<String>,
    /// Vector store URL (external mode).
    #[serde(default)]
    pub vector_url: Option<String>,
    /// Cache service URL, when an out-of-process cache is deployed.
    #[serde(default)]
    pub cache_url: Option<String>,
    /// Embedding dimension of the vector collection (default: 384).
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            mode: default_store_mode(),
            graph_url: None,
            graph_user: None,
            graph_password: None,
            vector_url: None,
            cache_url: None,
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

fn default_store_mode() -> String {
    "embedded".to_string()
}
fn default_embedding_dimension() -> usize {
    384
}

/// External collaborator endpoints.
///
/// Every collaborator is optional: the pipelines fall back to their built-in
/// rule-based paths when an endpoint is absent, so the engine works offline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    /// NER collaborator URL.
    #[serde(default)]
    pub ner_url: Option<String>,
    /// Embedding collaborator URL.
    #[serde(default)]
    pub embedding_url: Option<String>,
    /// LLM collaborator URL (relation extraction, intent fallback, synthesis).
    #[serde(default)]
    pub llm_url: Option<String>,
    /// LLM API key.
    #[serde(default)]
    pub llm_api_key: Option<String>,
    /// Disable every LLM fallback path even when `llm_url` is set.
    #[serde(default)]
    pub disable_llm_fallback: bool,
}

impl CollaboratorsConfig {
    /// Whether an LLM may be called at all.
    pub fn llm_enabled(&self) -> bool {
        self.llm_url.is_some() && !self.disable_llm_fallback
    }
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSettings {
    /// Chunking strategy: "semantic" (default) or "structural".
    #[serde(default = "default_chunk_strategy")]
    pub chunk_strategy: String,
    /// Soft chunk budget in estimated tokens (default: 800).
    #[serde(default = "default_chunk_token_budget")]
    pub chunk_token_budget: usize,
    /// Sentences of overlap between consecutive chunks (default: 2, range 1–3).
    #[serde(default = "default_chunk_overlap_sentences")]
    pub chunk_overlap_sentences: usize,
    /// Cosine-distance threshold starting a new semantic chunk (default: 0.35).
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,
    /// Concurrent chunk extractions per document (default: 8).
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,
    /// Concurrent documents across the process (default: 32).
    #[serde(default = "default_document_concurrency")]
    pub document_concurrency: usize,
    /// Hard deadline per chunk extraction, in seconds (default: 30).
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
    /// Retry attempts for transient extraction/store failures (default: 3).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base backoff delay in milliseconds (default: 1000).
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            chunk_strategy: default_chunk_strategy(),
            chunk_token_budget: default_chunk_token_budget(),
            chunk_overlap_sentences: default_chunk_overlap_sentences(),
            semantic_threshold: default_semantic_threshold(),
            chunk_concurrency: default_chunk_concurrency(),
            document_concurrency: default_document_concurrency(),
            extract_timeout_secs: default_extract_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

fn default_chunk_strategy() -> String {
    "semantic".to_string()
}
fn default_chunk_token_budget() -> usize {
    800
}
fn default_chunk_overlap_sentences() -> usize {
    2
}
fn default_semantic_threshold() -> f32 {
    0.35
}
fn default_chunk_concurrency() -> usize {
    8
}
fn default_document_concurrency() -> usize {
    32
}
fn default_extract_timeout_secs() -> u64 {
    30
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    1000
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Fused chunks returned by default (default: 10).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Soft global retrieval deadline in milliseconds (default: 3000).
    #[serde(default = "default_global_deadline_ms")]
    pub global_deadline_ms: u64,
    /// Hard per-strategy deadline in milliseconds (default: 2000).
    #[serde(default = "default_strategy_deadline_ms")]
    pub strategy_deadline_ms: u64,
    /// Vector over-fetch multiplier (default: 4).
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            global_deadline_ms: default_global_deadline_ms(),
            strategy_deadline_ms: default_strategy_deadline_ms(),
            overfetch_factor: default_overfetch_factor(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_global_deadline_ms() -> u64 {
    3000
}
fn default_strategy_deadline_ms() -> u64 {
    2000
}
fn default_overfetch_factor() -> usize {
    4
}

/// Reasoning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningSettings {
    /// Relation types treated as causal. Matching is case-insensitive.
    #[serde(default = "default_causal_relation_types")]
    pub causal_relation_types: Vec<String>,
    /// Maximum reasoning paths returned (default: 5).
    #[serde(default = "default_max_paths")]
    pub max_paths: usize,
    /// Beam width for multi-hop search (default: 4).
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            causal_relation_types: default_causal_relation_types(),
            max_paths: default_max_paths(),
            beam_width: default_beam_width(),
        }
    }
}

fn default_causal_relation_types() -> Vec<String> {
    vec![
        "causes".to_string(),
        "leads_to".to_string(),
        "results_in".to_string(),
        "contributes_to".to_string(),
    ]
}
fn default_max_paths() -> usize {
    5
}
fn default_beam_width() -> usize {
    4
}

/// Retrieval cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Whether query memoization is enabled (default: true).
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Entry TTL in seconds (default: 60).
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl_secs() -> u64 {
    60
}

impl LatticaConfig {
    /// Load configuration from a TOML file, apply environment overrides, and
    /// validate.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        let mut config: LatticaConfig =
            toml::from_str(&raw).map_err(|e| anyhow::anyhow!("invalid config file {path}: {e}"))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `LATTICA_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LATTICA_SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("LATTICA_SERVER_PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("LATTICA_SERVER_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Ok(v) = std::env::var("LATTICA_SERVER_LOG_FORMAT") {
            self.server.log_format = v;
        }
        if let Ok(v) = std::env::var("LATTICA_STORES_MODE") {
            self.stores.mode = v;
        }
        if let Ok(v) = std::env::var("LATTICA_STORES_GRAPH_URL") {
            self.stores.graph_url = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICA_STORES_GRAPH_USER") {
            self.stores.graph_user = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICA_STORES_GRAPH_PASSWORD") {
            self.stores.graph_password = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICA_STORES_VECTOR_URL") {
            self.stores.vector_url = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICA_STORES_CACHE_URL") {
            self.stores.cache_url = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICA_COLLABORATORS_NER_URL") {
            self.collaborators.ner_url = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICA_COLLABORATORS_EMBEDDING_URL") {
            self.collaborators.embedding_url = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICA_COLLABORATORS_LLM_URL") {
            self.collaborators.llm_url = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICA_COLLABORATORS_LLM_API_KEY") {
            self.collaborators.llm_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("LATTICA_DISABLE_LLM_FALLBACK") {
            self.collaborators.disable_llm_fallback = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stores.mode != "embedded" && self.stores.mode != "external" {
            anyhow::bail!(
                "stores.mode must be \"embedded\" or \"external\", got {:?}",
                self.stores.mode
            );
        }
        if self.stores.mode == "external" {
            if self.stores.graph_url.is_none() {
                anyhow::bail!("stores.graph_url is required in external mode");
            }
            if self.stores.vector_url.is_none() {
                anyhow::bail!("stores.vector_url is required in external mode");
            }
        }
        if self.stores.embedding_dimension == 0 {
            anyhow::bail!("stores.embedding_dimension must be ≥ 1");
        }
        if self.ingestion.chunk_strategy != "semantic" && self.ingestion.chunk_strategy != "structural"
        {
            anyhow::bail!(
                "ingestion.chunk_strategy must be \"semantic\" or \"structural\", got {:?}",
                self.ingestion.chunk_strategy
            );
        }
        if !(1..=3).contains(&self.ingestion.chunk_overlap_sentences) {
            anyhow::bail!("ingestion.chunk_overlap_sentences must be within 1..=3");
        }
        if self.ingestion.chunk_concurrency == 0 || self.ingestion.document_concurrency == 0 {
            anyhow::bail!("ingestion concurrency limits must be ≥ 1");
        }
        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be ≥ 1");
        }
        if self.retrieval.strategy_deadline_ms > self.retrieval.global_deadline_ms {
            anyhow::bail!(
                "retrieval.strategy_deadline_ms must not exceed retrieval.global_deadline_ms"
            );
        }
        if self.reasoning.causal_relation_types.is_empty() {
            anyhow::bail!("reasoning.causal_relation_types must not be empty");
        }
        if self.reasoning.beam_width == 0 {
            anyhow::bail!("reasoning.beam_width must be ≥ 1");
        }
        Ok(())
    }

    /// An example `lattica.toml` with inline documentation, for `--init-config`.
    pub fn example_toml_commented() -> String {
        r#"# Lattica configuration file.
# Every value shown is the default. Fields may also be overridden via
# LATTICA_* environment variables (see crate docs).

[server]
host = "0.0.0.0"
port = 8410
log_level = "info"       # trace | debug | info | warn | error
log_format = "text"      # text | json

[stores]
# "embedded" runs on in-memory reference stores; "external" uses the
# configured services below.
mode = "embedded"
# graph_url = "bolt://localhost:7687"
# graph_user = "neo4j"
# graph_password = ""
# vector_url = "http://localhost:6333"
# cache_url = "redis://localhost:6379"
embedding_dimension = 384

[collaborators]
# All collaborators are optional; rule-based fallbacks keep the engine
# working offline.
# ner_url = "http://localhost:9090/ner"
# embedding_url = "http://localhost:9091/embed"
# llm_url = "http://localhost:9092/v1/chat"
# llm_api_key = ""
disable_llm_fallback = false

[ingestion]
chunk_strategy = "semantic"        # semantic | structural
chunk_token_budget = 800
chunk_overlap_sentences = 2        # 1..=3
semantic_threshold = 0.35
chunk_concurrency = 8
document_concurrency = 32
extract_timeout_secs = 30
retry_attempts = 3
retry_base_ms = 1000

[retrieval]
top_k = 10
global_deadline_ms = 3000
strategy_deadline_ms = 2000
overfetch_factor = 4

[reasoning]
causal_relation_types = ["causes", "leads_to", "results_in", "contributes_to"]
max_paths = 5
beam_width = 4

[cache]
enabled = true
ttl_secs = 60
"#
        .to_string()
    }
}
