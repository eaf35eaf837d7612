//! Configuration management for the PaperForge knowledge-graph subsystem
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Project-level cache configuration (optional network tier; the Graph Store's
    /// mandated LRU caches are in-process and not configured here)
    pub cache: CacheConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// LLM service configuration
    pub llm: LlmConfig,

    /// Entity resolution thresholds
    pub resolution: ResolutionConfig,

    /// Semantic chunker parameters
    pub chunker: ChunkerConfig,

    /// Graph store parameters
    pub graph: GraphConfig,

    /// Gap detector parameters
    pub gap: GapConfig,

    /// Agent orchestrator parameters
    pub orchestrator: OrchestratorConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Redis URL (unset disables the network cache tier)
    pub url: Option<String>,

    /// Pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: u32,

    /// Default TTL in seconds
    #[serde(default = "default_redis_ttl")]
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Primary embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Secondary provider used for the remainder of a batch on repeated primary failure
    pub fallback_provider: Option<String>,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (primary provider: 1536)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries before failing over
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum distinct terms the TF-IDF fallback vectorizer may track
    #[serde(default = "default_tfidf_max_concepts")]
    pub tfidf_max_concepts: usize,

    /// Dimension of the TF-IDF fallback vector
    #[serde(default = "default_tfidf_max_features")]
    pub tfidf_max_features: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Ordered provider names; first is primary, rest are fallbacks
    #[serde(default = "default_llm_providers")]
    pub providers: Vec<String>,

    /// API key lookup: user-preference value, if the caller supplied one
    pub user_api_key: Option<String>,

    /// Server-side API key (env/default tier of the lookup order)
    pub api_key: Option<String>,

    /// API base URL
    pub api_base: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Requests-per-minute token bucket per provider
    #[serde(default = "default_llm_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Maximum retries before provider fallback
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,

    /// Backoff cap in seconds
    #[serde(default = "default_llm_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolutionConfig {
    /// Cosine similarity above which embedding candidates auto-merge
    #[serde(default = "default_auto_merge_threshold")]
    pub auto_merge_threshold: f32,

    /// Lower bound of the uncertain window routed to LLM confirmation
    #[serde(default = "default_uncertain_threshold")]
    pub uncertain_threshold: f32,

    /// Maximum uncertain pairs submitted to the LLM per ingest
    #[serde(default = "default_llm_batch_cap")]
    pub llm_batch_cap: usize,

    /// Fraction of declined merges sampled into the audit record
    #[serde(default = "default_false_merge_sample_rate")]
    pub false_merge_sample_rate: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkerConfig {
    /// Minimum target paragraph size in tokens
    #[serde(default = "default_paragraph_tokens_min")]
    pub paragraph_tokens_min: usize,

    /// Maximum target paragraph size in tokens
    #[serde(default = "default_paragraph_tokens_max")]
    pub paragraph_tokens_max: usize,

    /// Chunks below this token count are merged into the following sibling
    #[serde(default = "default_merge_forward_threshold")]
    pub merge_forward_threshold: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Default BFS hop cap for graph traversal
    #[serde(default = "default_hop_cap")]
    pub hop_cap: u32,

    /// HNSW-style vector index connectivity parameter
    #[serde(default = "default_hnsw_m")]
    pub hnsw_m: u32,

    /// HNSW-style vector index construction parameter
    #[serde(default = "default_hnsw_ef_construction")]
    pub hnsw_ef_construction: u32,

    /// Visualization node cap
    #[serde(default = "default_viz_max_nodes")]
    pub visualization_max_nodes: usize,

    /// Visualization edge cap
    #[serde(default = "default_viz_max_edges")]
    pub visualization_max_edges: usize,

    /// Max projects held in the centrality LRU cache
    #[serde(default = "default_centrality_cache_capacity")]
    pub centrality_cache_capacity: usize,

    /// Heavy-metrics cache TTL in seconds
    #[serde(default = "default_heavy_metrics_ttl")]
    pub heavy_metrics_ttl_secs: u64,

    /// Heavy-metrics cache entry capacity
    #[serde(default = "default_heavy_metrics_capacity")]
    pub heavy_metrics_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GapConfig {
    /// Inter-cluster strength below which a pair is a candidate gap
    #[serde(default = "default_gap_strength_threshold")]
    pub strength_threshold: f32,

    /// Minimum semantic distance required to keep a candidate gap
    #[serde(default = "default_gap_min_semantic_distance")]
    pub min_semantic_distance: f32,

    /// Max bridge candidates returned per gap
    #[serde(default = "default_max_bridge_candidates")]
    pub max_bridge_candidates: usize,

    /// Max LLM-generated research questions per gap
    #[serde(default = "default_max_research_questions")]
    pub max_research_questions: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Per-stage timeout in seconds
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// Overall query pipeline deadline in seconds
    #[serde(default = "default_overall_deadline_secs")]
    pub overall_deadline_secs: u64,

    /// Max papers extracted concurrently during a single ingest
    #[serde(default = "default_extraction_concurrency")]
    pub extraction_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable the Prometheus exporter)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_connections() -> u32 {
    50
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    300
}
fn default_redis_pool_size() -> u32 {
    20
}
fn default_redis_ttl() -> u64 {
    300
}
fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    crate::DEFAULT_EMBEDDING_MODEL.to_string()
}
fn default_embedding_dimension() -> usize {
    crate::DEFAULT_EMBEDDING_DIMENSION
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_embedding_retries() -> u32 {
    3
}
fn default_batch_size() -> usize {
    100
}
fn default_tfidf_max_concepts() -> usize {
    1200
}
fn default_tfidf_max_features() -> usize {
    64
}
fn default_llm_providers() -> Vec<String> {
    vec!["primary".to_string(), "alternate-a".to_string(), "alternate-b".to_string()]
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_requests_per_minute() -> u32 {
    10
}
fn default_llm_max_retries() -> u32 {
    3
}
fn default_llm_backoff_cap_secs() -> u64 {
    8
}
fn default_auto_merge_threshold() -> f32 {
    0.95
}
fn default_uncertain_threshold() -> f32 {
    0.85
}
fn default_llm_batch_cap() -> usize {
    50
}
fn default_false_merge_sample_rate() -> f32 {
    0.05
}
fn default_paragraph_tokens_min() -> usize {
    256
}
fn default_paragraph_tokens_max() -> usize {
    512
}
fn default_merge_forward_threshold() -> usize {
    20
}
fn default_hop_cap() -> u32 {
    3
}
fn default_hnsw_m() -> u32 {
    16
}
fn default_hnsw_ef_construction() -> u32 {
    64
}
fn default_viz_max_nodes() -> usize {
    1000
}
fn default_viz_max_edges() -> usize {
    15000
}
fn default_centrality_cache_capacity() -> usize {
    20
}
fn default_heavy_metrics_ttl() -> u64 {
    30
}
fn default_heavy_metrics_capacity() -> usize {
    12
}
fn default_gap_strength_threshold() -> f32 {
    0.1
}
fn default_gap_min_semantic_distance() -> f32 {
    0.3
}
fn default_max_bridge_candidates() -> usize {
    5
}
fn default_max_research_questions() -> usize {
    3
}
fn default_stage_timeout_secs() -> u64 {
    15
}
fn default_overall_deadline_secs() -> u64 {
    30
}
fn default_extraction_concurrency() -> usize {
    4
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_service_name() -> String {
    "paperforge-kg".to_string()
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__DATABASE__URL=postgres://...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database
            .read_url
            .as_deref()
            .unwrap_or(&self.database.url)
    }

    /// Per-stage orchestrator timeout as a `Duration`
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.stage_timeout_secs)
    }

    /// Overall query pipeline deadline as a `Duration`
    pub fn overall_deadline(&self) -> Duration {
        Duration::from_secs(self.orchestrator.overall_deadline_secs)
    }

    /// Resolve the effective LLM API key following `user-preference → env → default`.
    pub fn resolve_llm_api_key(&self) -> Option<&str> {
        self.llm
            .user_api_key
            .as_deref()
            .or(self.llm.api_key.as_deref())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/paperforge".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            cache: CacheConfig {
                url: None,
                pool_size: default_redis_pool_size(),
                default_ttl_secs: default_redis_ttl(),
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                fallback_provider: None,
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
                max_retries: default_embedding_retries(),
                batch_size: default_batch_size(),
                tfidf_max_concepts: default_tfidf_max_concepts(),
                tfidf_max_features: default_tfidf_max_features(),
            },
            llm: LlmConfig {
                providers: default_llm_providers(),
                user_api_key: None,
                api_key: None,
                api_base: None,
                model: default_llm_model(),
                requests_per_minute: default_llm_requests_per_minute(),
                max_retries: default_llm_max_retries(),
                backoff_cap_secs: default_llm_backoff_cap_secs(),
            },
            resolution: ResolutionConfig {
                auto_merge_threshold: default_auto_merge_threshold(),
                uncertain_threshold: default_uncertain_threshold(),
                llm_batch_cap: default_llm_batch_cap(),
                false_merge_sample_rate: default_false_merge_sample_rate(),
            },
            chunker: ChunkerConfig {
                paragraph_tokens_min: default_paragraph_tokens_min(),
                paragraph_tokens_max: default_paragraph_tokens_max(),
                merge_forward_threshold: default_merge_forward_threshold(),
            },
            graph: GraphConfig {
                hop_cap: default_hop_cap(),
                hnsw_m: default_hnsw_m(),
                hnsw_ef_construction: default_hnsw_ef_construction(),
                visualization_max_nodes: default_viz_max_nodes(),
                visualization_max_edges: default_viz_max_edges(),
                centrality_cache_capacity: default_centrality_cache_capacity(),
                heavy_metrics_ttl_secs: default_heavy_metrics_ttl(),
                heavy_metrics_capacity: default_heavy_metrics_capacity(),
            },
            gap: GapConfig {
                strength_threshold: default_gap_strength_threshold(),
                min_semantic_distance: default_gap_min_semantic_distance(),
                max_bridge_candidates: default_max_bridge_candidates(),
                max_research_questions: default_max_research_questions(),
            },
            orchestrator: OrchestratorConfig {
                stage_timeout_secs: default_stage_timeout_secs(),
                overall_deadline_secs: default_overall_deadline_secs(),
                extraction_concurrency: default_extraction_concurrency(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.orchestrator.stage_timeout_secs, 15);
        assert_eq!(config.orchestrator.overall_deadline_secs, 30);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/paperforge");
    }

    #[test]
    fn test_llm_api_key_precedence() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("server-key".to_string());
        assert_eq!(config.resolve_llm_api_key(), Some("server-key"));

        config.llm.user_api_key = Some("user-key".to_string());
        assert_eq!(config.resolve_llm_api_key(), Some("user-key"));
    }
}
