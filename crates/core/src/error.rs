//! Shared error taxonomy (see spec §7).
//!
//! Every public error in the workspace ultimately boils down to one of these
//! variants so the HTTP layer can produce a stable `{code, message,
//! retriable}` envelope without knowing which component raised it.

use thiserror::Error;

/// Top-level error type returned by core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    // -- invalid input -------------------------------------------------
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("session not found")]
    SessionNotFound,
    #[error("session is not active")]
    SessionNotActive,
    #[error("raid is not active")]
    RaidNotActive,
    #[error("raid is full")]
    RaidFull,
    #[error("participant already joined")]
    AlreadyJoined,
    #[error("platform identity missing required fields")]
    PlatformIdentityMissing,
    #[error("conflicting verified identity binding")]
    ConflictingVerification,

    // -- rejected by policy ---------------------------------------------
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("invalid adapter signature")]
    InvalidSignature,
    #[error("source is blocked")]
    BlockedSource,
    #[error("duplicate message")]
    Duplicate,
    #[error("spam detected")]
    SpamDetected,

    // -- transient --------------------------------------------------
    #[error("pool checkout timed out")]
    PoolTimeout,
    #[error("pool backpressure exceeded")]
    BackpressureExceeded,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("verification not yet available")]
    VerifyNotYet,

    // -- fatal --------------------------------------------------------
    #[error("database pool unreachable: {0}")]
    PoolUnreachable(String),
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    EmbeddingDimensionMismatch { expected: usize, got: usize },
}

impl CoreError {
    /// Stable machine-readable code, surfaced to HTTP/WS clients.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidRequest(_) => "invalid_request",
            CoreError::SessionNotFound => "session_not_found",
            CoreError::SessionNotActive => "session_not_active",
            CoreError::RaidNotActive => "raid_not_active",
            CoreError::RaidFull => "raid_full",
            CoreError::AlreadyJoined => "already_joined",
            CoreError::PlatformIdentityMissing => "platform_identity_missing",
            CoreError::ConflictingVerification => "conflicting_verification",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::InvalidSignature => "invalid_signature",
            CoreError::BlockedSource => "blocked_source",
            CoreError::Duplicate => "duplicate",
            CoreError::SpamDetected => "spam_detected",
            CoreError::PoolTimeout => "pool_timeout",
            CoreError::BackpressureExceeded => "backpressure_exceeded",
            CoreError::UpstreamUnavailable(_) => "upstream_unavailable",
            CoreError::VerifyNotYet => "verify_not_yet",
            CoreError::PoolUnreachable(_) => "pool_unreachable",
            CoreError::ConfigInvalid(_) => "config_invalid",
            CoreError::EmbeddingDimensionMismatch { .. } => "embedding_dimension_mismatch",
        }
    }

    /// Whether a client may usefully retry the operation (§7).
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            CoreError::PoolTimeout
                | CoreError::BackpressureExceeded
                | CoreError::UpstreamUnavailable(_)
                | CoreError::VerifyNotYet
                | CoreError::RateLimited { .. }
        )
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            CoreError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
