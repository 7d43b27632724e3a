//! Configuration management for Toponym services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use crate::errors::AppError;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tolerance used when checking that signal weights sum to one
const WEIGHT_SUM_TOLERANCE: f32 = 1e-6;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Gazetteer source configuration
    pub gazetteer: GazetteerConfig,

    /// Resolution engine tuning
    pub resolver: ResolverConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum tokens accepted in one resolve request
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_request: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL
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

    /// Run embedded migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashing
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Where canonical places are read from
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GazetteerSource {
    /// PostgreSQL with the pg_trgm extension
    Postgres,
    /// JSON seed file loaded into memory
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GazetteerConfig {
    /// Backing store for canonical places
    #[serde(default = "default_gazetteer_source")]
    pub source: GazetteerSource,

    /// Seed file used when `source = file`
    pub seed_path: Option<String>,

    /// Per-query timeout in milliseconds
    #[serde(default = "default_gazetteer_timeout")]
    pub query_timeout_ms: u64,
}

/// How entity-class priority interacts with score gaps
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriorityPolicy {
    /// Priority only orders near-tied candidates; a tie still needs clarification
    #[default]
    OrderOnly,
    /// A strictly higher class wins a near-tie and resolves the token
    BreakTies,
}

/// Weights of the additive signals in the final score
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct SignalWeights {
    #[serde(default = "default_lexical_weight")]
    pub lexical: f32,

    #[serde(default = "default_trigram_weight")]
    pub trigram: f32,

    #[serde(default = "default_semantic_weight")]
    pub semantic: f32,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            lexical: default_lexical_weight(),
            trigram: default_trigram_weight(),
            semantic: default_semantic_weight(),
        }
    }
}

impl SignalWeights {
    pub fn sum(&self) -> f32 {
        self.lexical + self.trigram + self.semantic
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Minimum final score for a candidate to be accepted
    #[serde(default = "default_resolve_threshold")]
    pub resolve_threshold: f32,

    /// Minimum margin between rank-1 and rank-2 for gap-based acceptance
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold: f32,

    /// Signal fusion weights (must sum to 1.0)
    #[serde(default)]
    pub weights: SignalWeights,

    /// Score floor applied when the phonetic codes are equal
    #[serde(default = "default_phonetic_floor")]
    pub phonetic_floor: f32,

    /// Approximate matches requested per entity class
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit_per_class: usize,

    /// Minimum trigram similarity for a gazetteer row to become a candidate
    #[serde(default = "default_approx_match_floor")]
    pub approx_match_floor: f32,

    /// Precedence between class priority and score gaps
    #[serde(default)]
    pub priority_policy: PriorityPolicy,

    /// Timeout for the per-token embedding request in milliseconds
    #[serde(default = "default_semantic_timeout")]
    pub semantic_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_tokens() -> usize { 32 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "hashing".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 256 }
fn default_embedding_timeout() -> u64 { 10 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 100 }
fn default_gazetteer_source() -> GazetteerSource { GazetteerSource::Postgres }
fn default_gazetteer_timeout() -> u64 { 800 }
fn default_resolve_threshold() -> f32 { 0.75 }
fn default_gap_threshold() -> f32 { 0.08 }
fn default_lexical_weight() -> f32 { 0.4 }
fn default_trigram_weight() -> f32 { 0.4 }
fn default_semantic_weight() -> f32 { 0.2 }
fn default_phonetic_floor() -> f32 { 0.9 }
fn default_candidate_limit() -> usize { 5 }
fn default_approx_match_floor() -> f32 { 0.3 }
fn default_semantic_timeout() -> u64 { 500 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "toponym".to_string() }

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resolve_threshold: default_resolve_threshold(),
            gap_threshold: default_gap_threshold(),
            weights: SignalWeights::default(),
            phonetic_floor: default_phonetic_floor(),
            candidate_limit_per_class: default_candidate_limit(),
            approx_match_floor: default_approx_match_floor(),
            priority_policy: PriorityPolicy::default(),
            semantic_timeout_ms: default_semantic_timeout(),
        }
    }
}

impl ResolverConfig {
    /// Reject tunings that cannot produce scores in [0, 1]
    pub fn validate(&self) -> Result<(), AppError> {
        let w = &self.weights;
        if w.lexical < 0.0 || w.trigram < 0.0 || w.semantic < 0.0 {
            return Err(AppError::Configuration {
                message: "signal weights must be non-negative".to_string(),
            });
        }

        if (w.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AppError::Configuration {
                message: format!("signal weights must sum to 1.0, got {:.4}", w.sum()),
            });
        }

        for (name, value) in [
            ("resolve_threshold", self.resolve_threshold),
            ("gap_threshold", self.gap_threshold),
            ("phonetic_floor", self.phonetic_floor),
            ("approx_match_floor", self.approx_match_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Configuration {
                    message: format!("{} must lie in [0, 1], got {}", name, value),
                });
            }
        }

        if self.candidate_limit_per_class == 0 {
            return Err(AppError::Configuration {
                message: "candidate_limit_per_class must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Embedding timeout as Duration
    pub fn semantic_timeout(&self) -> Duration {
        Duration::from_millis(self.semantic_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "postgres://localhost/toponym")?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__RESOLVER__GAP_THRESHOLD=0.1
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Validate cross-field constraints; fatal at startup
    pub fn validate(&self) -> Result<(), AppError> {
        self.resolver.validate()?;

        if self.gazetteer.source == GazetteerSource::File && self.gazetteer.seed_path.is_none() {
            return Err(AppError::Configuration {
                message: "gazetteer.seed_path is required when gazetteer.source = file".to_string(),
            });
        }

        if self.embedding.provider == "openai" && self.embedding.api_key.is_none() {
            return Err(AppError::Configuration {
                message: "embedding.api_key is required for the openai provider".to_string(),
            });
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Gazetteer query timeout as Duration
    pub fn gazetteer_timeout(&self) -> Duration {
        Duration::from_millis(self.gazetteer.query_timeout_ms)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
                max_tokens_per_request: default_max_tokens(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/toponym".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                run_migrations: false,
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
                max_retries: default_embedding_retries(),
                batch_size: default_batch_size(),
            },
            gazetteer: GazetteerConfig {
                source: default_gazetteer_source(),
                seed_path: None,
                query_timeout_ms: default_gazetteer_timeout(),
            },
            resolver: ResolverConfig::default(),
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
        }
    }
}
