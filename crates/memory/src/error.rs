use raidcore_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("vector store connection error: {0}")]
    Connection(String),
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] raidcore_persistence::PersistenceError),
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<MemoryError> for CoreError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Persistence(e) => e.into(),
            MemoryError::DimensionMismatch { expected, got } => CoreError::EmbeddingDimensionMismatch { expected, got },
            MemoryError::Connection(msg) | MemoryError::VectorStore(msg) | MemoryError::Search(msg) => {
                CoreError::UpstreamUnavailable(msg)
            }
            MemoryError::Decode(msg) => CoreError::UpstreamUnavailable(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
