//! The `{code, message, retriable}` client error envelope (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use raidcore_core::CoreError;
use serde::Serialize;
use thiserror::Error;

/// Server-local errors that never originate from [`CoreError`]: malformed
/// request bodies, path params that don't parse, and WebSocket protocol
/// violations.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found")]
    NotFound,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    code: &'static str,
    message: String,
    retriable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

fn status_for_core(err: &CoreError) -> StatusCode {
    match err {
        CoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CoreError::SessionNotFound => StatusCode::NOT_FOUND,
        CoreError::SessionNotActive | CoreError::RaidNotActive => StatusCode::CONFLICT,
        CoreError::RaidFull | CoreError::AlreadyJoined => StatusCode::CONFLICT,
        CoreError::PlatformIdentityMissing => StatusCode::BAD_REQUEST,
        CoreError::ConflictingVerification => StatusCode::CONFLICT,
        CoreError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        CoreError::InvalidSignature => StatusCode::UNAUTHORIZED,
        CoreError::BlockedSource => StatusCode::FORBIDDEN,
        CoreError::Duplicate => StatusCode::CONFLICT,
        CoreError::SpamDetected => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::PoolTimeout | CoreError::BackpressureExceeded | CoreError::UpstreamUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CoreError::VerifyNotYet => StatusCode::ACCEPTED,
        CoreError::PoolUnreachable(_) | CoreError::ConfigInvalid(_) | CoreError::EmbeddingDimensionMismatch { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, envelope) = match &self {
            ServerError::Core(err) => (
                status_for_core(err),
                ErrorEnvelope {
                    code: err.code(),
                    message: err.to_string(),
                    retriable: err.retriable(),
                    retry_after_ms: err.retry_after_ms(),
                },
            ),
            ServerError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorEnvelope {
                    code: "invalid_request",
                    message: msg.clone(),
                    retriable: false,
                    retry_after_ms: None,
                },
            ),
            ServerError::NotFound => (
                StatusCode::NOT_FOUND,
                ErrorEnvelope {
                    code: "not_found",
                    message: self.to_string(),
                    retriable: false,
                    retry_after_ms: None,
                },
            ),
        };

        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_maps_to_too_many_requests_and_is_retriable() {
        let err = CoreError::RateLimited { retry_after_ms: 500 };
        assert_eq!(status_for_core(&err), StatusCode::TOO_MANY_REQUESTS);
        assert!(err.retriable());
        assert_eq!(err.retry_after_ms(), Some(500));
    }

    #[test]
    fn session_not_found_maps_to_404_and_is_not_retriable() {
        let err = CoreError::SessionNotFound;
        assert_eq!(status_for_core(&err), StatusCode::NOT_FOUND);
        assert!(!err.retriable());
    }

    #[test]
    fn invalid_request_carries_its_message() {
        let err = ServerError::InvalidRequest("bad id".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
