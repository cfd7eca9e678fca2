use raidcore_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelEngineError {
    #[error("request build error: {0}")]
    Request(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("upstream returned non-success status: {0}")]
    Status(u16),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ModelEngineError {
    fn from(err: reqwest::Error) -> Self {
        ModelEngineError::Upstream(err.to_string())
    }
}

impl From<ModelEngineError> for CoreError {
    fn from(err: ModelEngineError) -> Self {
        match err {
            ModelEngineError::Upstream(msg) | ModelEngineError::Request(msg) | ModelEngineError::Decode(msg) => {
                CoreError::UpstreamUnavailable(msg)
            }
            ModelEngineError::Status(code) => CoreError::UpstreamUnavailable(format!("status {code}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelEngineError>;
