//! Main settings module.
//!
//! Layering (spec §6 "Environment flags"): `config/default.toml` <
//! `config/{env}.toml` < environment variables. The bare env var names
//! listed in spec §6 (`TIMEOUT_MS_DEFAULT`, etc.) are bound directly,
//! without the `RAIDCORE_` prefix used for everything else, for
//! operational familiarity with the spec.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_grace_ms() -> u64 {
    std::env::var("SHUTDOWN_GRACE_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(15_000)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cors_enabled: false,
            cors_origins: vec![],
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: i64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_retention_ms")]
    pub retention_ms: u64,
}

fn default_timeout_ms() -> i64 {
    std::env::var("TIMEOUT_MS_DEFAULT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3_600_000)
}

fn default_sweep_interval_ms() -> u64 {
    std::env::var("SWEEP_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60_000)
}

fn default_retention_ms() -> u64 {
    24 * 3_600_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            retention_ms: default_retention_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,
    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
    #[serde(default = "default_pool_tx_size")]
    pub pool_tx_size: u32,
    #[serde(default = "default_pool_sess_size")]
    pub pool_sess_size: u32,
    #[serde(default = "default_wait_queue")]
    pub wait_queue_depth: u32,
    #[serde(default = "default_simple_timeout_ms")]
    pub simple_timeout_ms: u64,
    #[serde(default = "default_complex_timeout_ms")]
    pub complex_timeout_ms: u64,
    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "raidcore".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

fn default_pool_tx_size() -> u32 {
    std::env::var("POOL_TX_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(20)
}

fn default_pool_sess_size() -> u32 {
    std::env::var("POOL_SESS_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(5)
}

fn default_wait_queue() -> u32 {
    100
}

fn default_simple_timeout_ms() -> u64 {
    5_000
}

fn default_complex_timeout_ms() -> u64 {
    30_000
}

fn default_health_interval_ms() -> u64 {
    30_000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
            pool_tx_size: default_pool_tx_size(),
            pool_sess_size: default_pool_sess_size(),
            wait_queue_depth: default_wait_queue(),
            simple_timeout_ms: default_simple_timeout_ms(),
            complex_timeout_ms: default_complex_timeout_ms(),
            health_interval_ms: default_health_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,
    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    #[serde(default = "default_embed_on_write_kinds")]
    pub embed_on_write_kinds: Vec<String>,
    #[serde(default = "default_embedding_endpoint")]
    pub embedding_endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub embedding_api_key: Option<String>,
    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,
}

fn default_qdrant_endpoint() -> String {
    std::env::var("QDRANT_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

fn default_qdrant_collection() -> String {
    "raidcore_memory".to_string()
}

fn default_embedding_dim() -> usize {
    std::env::var("EMBEDDING_DIM").ok().and_then(|v| v.parse().ok()).unwrap_or(384)
}

fn default_embed_on_write_kinds() -> Vec<String> {
    vec!["conversation_turn".to_string(), "note".to_string()]
}

fn default_embedding_endpoint() -> String {
    std::env::var("EMBEDDING_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:8081/v1/embeddings".to_string())
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_timeout_ms() -> u64 {
    5_000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection: default_qdrant_collection(),
            embedding_dim: default_embedding_dim(),
            qdrant_api_key: None,
            embed_on_write_kinds: default_embed_on_write_kinds(),
            embedding_endpoint: default_embedding_endpoint(),
            embedding_model: default_embedding_model(),
            embedding_api_key: None,
            embedding_timeout_ms: default_embedding_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    #[serde(default = "default_rate_limit_per_min")]
    pub rate_limit_per_min: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_dedup_ttl_ms")]
    pub dedup_ttl_ms: u64,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default = "default_blocklist_threshold")]
    pub blocklist_threshold: u32,
}

fn default_rate_limit_per_min() -> u32 {
    std::env::var("RATE_LIMIT_PER_MIN").ok().and_then(|v| v.parse().ok()).unwrap_or(100)
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_dedup_ttl_ms() -> u64 {
    std::env::var("DEDUP_TTL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(300_000)
}

fn default_dedup_capacity() -> usize {
    100_000
}

fn default_blocklist_threshold() -> u32 {
    5
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_min: default_rate_limit_per_min(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            dedup_ttl_ms: default_dedup_ttl_ms(),
            dedup_capacity: default_dedup_capacity(),
            blocklist_threshold: default_blocklist_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaidConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_verify_latency_min_ms")]
    pub verify_latency_min_ms: u64,
    #[serde(default = "default_verify_concurrency")]
    pub verify_concurrency: usize,
    #[serde(default)]
    pub auto_start_on_join: bool,
}

fn default_poll_interval_ms() -> u64 {
    std::env::var("VERIFY_POLL_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(30_000)
}

fn default_verify_latency_min_ms() -> u64 {
    3_000
}

fn default_verify_concurrency() -> usize {
    4
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            verify_latency_min_ms: default_verify_latency_min_ms(),
            verify_concurrency: default_verify_concurrency(),
            auto_start_on_join: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEngineConfig {
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_model_endpoint() -> String {
    std::env::var("MODEL_ENGINE_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:8082/v1/chat/completions".to_string())
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_model_timeout_ms() -> u64 {
    15_000
}

impl Default for ModelEngineConfig {
    fn default() -> Self {
        Self {
            endpoint: default_model_endpoint(),
            model: default_model_name(),
            api_key: None,
            request_timeout_ms: default_model_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub tracing_enabled: bool,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default)]
    pub raid: RaidConfig,
    #[serde(default)]
    pub model_engine: ModelEngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Checks the invariants `load_settings` can't express through serde
    /// defaults alone — a malformed pool size or concurrency bound should
    /// fail startup with a clear message rather than surface later as a
    /// confusing runtime panic or a Router that can never acquire a permit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persistence.pool_tx_size == 0 {
            return Err(ConfigError::Invalid("persistence.pool_tx_size must be greater than 0".to_string()));
        }
        if self.persistence.pool_sess_size == 0 {
            return Err(ConfigError::Invalid("persistence.pool_sess_size must be greater than 0".to_string()));
        }
        if self.persistence.wait_queue_depth == 0 {
            return Err(ConfigError::Invalid("persistence.wait_queue_depth must be greater than 0".to_string()));
        }
        if self.raid.verify_concurrency == 0 {
            return Err(ConfigError::Invalid("raid.verify_concurrency must be greater than 0".to_string()));
        }
        if self.session.default_timeout_ms <= 0 {
            return Err(ConfigError::Invalid("session.default_timeout_ms must be greater than 0".to_string()));
        }
        if self.memory.embedding_dim == 0 {
            return Err(ConfigError::Invalid("memory.embedding_dim must be greater than 0".to_string()));
        }
        if self.ingress.rate_limit_per_min == 0 {
            return Err(ConfigError::Invalid("ingress.rate_limit_per_min must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Load settings from `config/default.{toml}`, an optional
/// `config/{env}.toml` override, and environment variables prefixed
/// `RAIDCORE_` (double-underscore separated for nesting, e.g.
/// `RAIDCORE_SERVER__PORT`). Validates the result before returning it.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder().add_source(File::with_name("config/default").required(false));

    if let Some(env) = env {
        builder = builder.add_source(File::with_name(&format!("config/{env}")).required(false));
    }

    let builder = builder.add_source(
        Environment::with_prefix("RAIDCORE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_any_file() {
        let settings = load_settings(None).expect("defaults should always parse");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.persistence.pool_tx_size, 20);
        assert_eq!(settings.persistence.pool_sess_size, 5);
    }

    #[test]
    fn defaults_pass_validation() {
        Settings::default().validate().expect("defaults must be valid");
    }

    #[test]
    fn zero_pool_tx_size_is_rejected() {
        let mut settings = Settings::default();
        settings.persistence.pool_tx_size = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_verify_concurrency_is_rejected() {
        let mut settings = Settings::default();
        settings.raid.verify_concurrency = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }
}
