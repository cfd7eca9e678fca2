use raidcore_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Load(e) => CoreError::ConfigInvalid(e.to_string()),
            ConfigError::Invalid(msg) => CoreError::ConfigInvalid(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configuration_maps_to_config_invalid_core_error() {
        let err: CoreError = ConfigError::Invalid("persistence.pool_tx_size must be greater than 0".to_string()).into();
        assert!(matches!(err, CoreError::ConfigInvalid(_)));
        assert_eq!(err.code(), "config_invalid");
    }
}
