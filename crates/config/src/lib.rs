//! Layered configuration for the session/raid coordination core.

pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{
    IngressConfig, MemoryConfig, ModelEngineConfig, ObservabilityConfig, PersistenceConfig, RaidConfig,
    RuntimeEnvironment, ServerConfig, SessionConfig, Settings, load_settings,
};
