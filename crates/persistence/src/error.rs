//! Persistence error taxonomy; converts into [`raidcore_core::CoreError`] at
//! the crate boundary so callers above this layer never see ScyllaDB types.

use raidcore_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("schema error: {0}")]
    Schema(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("pool checkout timed out")]
    PoolTimeout,
    #[error("pool backpressure exceeded (wait queue full)")]
    BackpressureExceeded,
    #[error("pool degraded: {0}")]
    PoolDegraded(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("row decode error: {0}")]
    Decode(String),
    #[error("identity conflict")]
    ConflictingVerification,
    #[error("not found")]
    NotFound,
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<PersistenceError> for CoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::PoolTimeout => CoreError::PoolTimeout,
            PersistenceError::BackpressureExceeded => CoreError::BackpressureExceeded,
            PersistenceError::PoolDegraded(msg) | PersistenceError::Connection(msg) => {
                CoreError::PoolUnreachable(msg)
            }
            PersistenceError::ConflictingVerification => CoreError::ConflictingVerification,
            PersistenceError::NotFound => CoreError::SessionNotFound,
            PersistenceError::Schema(msg) | PersistenceError::Query(msg) | PersistenceError::Decode(msg) => {
                CoreError::UpstreamUnavailable(msg)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
