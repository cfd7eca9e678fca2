use raidcore_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum IngressError {
    #[error("source is blocked")]
    Blocked,
    #[error("invalid adapter signature")]
    InvalidSignature,
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("duplicate message")]
    Duplicate,
    #[error("payload missing required field: {0}")]
    SchemaInvalid(String),
    #[error("spam detected")]
    SpamDetected,
}

impl From<IngressError> for CoreError {
    fn from(err: IngressError) -> Self {
        match err {
            IngressError::Blocked => CoreError::BlockedSource,
            IngressError::InvalidSignature => CoreError::InvalidSignature,
            IngressError::RateLimited { retry_after_ms } => CoreError::RateLimited { retry_after_ms },
            IngressError::Duplicate => CoreError::Duplicate,
            IngressError::SchemaInvalid(msg) => CoreError::InvalidRequest(msg),
            IngressError::SpamDetected => CoreError::SpamDetected,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngressError>;
