//! Dispatch error types with HTTP status and close code mapping.
//!
//! [`DispatchError`] is the central error type of the crate. Every failed
//! lifecycle step produces exactly one variant, which is routed to the
//! [`crate::service::ErrorReporter`]. Variants that can only be produced by a
//! broken invariant or a misbehaving caller are flagged by
//! [`DispatchError::is_invariant_violation`] so they can be told apart from
//! ordinary network churn.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::{ConnId, PoolId};

/// Boxed error used at collaborator boundaries (verifier, upgrader, factory,
/// processor). The core never inspects it beyond its `Display` output.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "verification failed: missing token"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code (see the table on [`DispatchError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Errors produced while dispatching a connection.
///
/// # Error Code Ranges
///
/// | Range     | Category              | HTTP Status               |
/// |-----------|-----------------------|---------------------------|
/// | 1000–1999 | Handshake             | 401 / 400                 |
/// | 2000–2999 | Invariant violation   | 409 Conflict / 404        |
/// | 3000–3999 | Capacity / factory    | 503 / 500                 |
/// | 4000–4999 | Application           | 500                       |
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The verifier rejected the raw request. No upgrade was attempted.
    #[error("verification failed: {0}")]
    VerificationFailed(#[source] BoxError),

    /// The transport could not produce a live connection.
    #[error("upgrade failed: {0}")]
    UpgradeFailed(#[source] BoxError),

    /// The connection is already a member of a pool.
    #[error("connection {conn_id} is already a member of pool {pool_id}")]
    AlreadyMember {
        /// Connection that was added twice.
        conn_id: ConnId,
        /// Pool currently holding the connection.
        pool_id: PoolId,
    },

    /// The connection is not a member of any pool (double release).
    #[error("connection {0} not found in any pool")]
    NotFound(ConnId),

    /// A pool refused an insert because it has no spare capacity.
    #[error("pool {0} is full")]
    PoolFull(PoolId),

    /// No pool has room and the pool-count ceiling has been reached.
    #[error("pool directory is full ({max_pools} pools)")]
    DirectoryFull {
        /// Configured pool-count ceiling.
        max_pools: usize,
    },

    /// The pool factory failed to build a new pool.
    #[error("pool factory failed: {0}")]
    FactoryError(#[source] BoxError),

    /// The connection processor returned an error.
    #[error("processing failed: {0}")]
    ProcessingFailed(#[source] BoxError),
}

impl DispatchError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::VerificationFailed(_) => 1001,
            Self::UpgradeFailed(_) => 1002,
            Self::AlreadyMember { .. } => 2001,
            Self::NotFound(_) => 2002,
            Self::PoolFull(_) => 2003,
            Self::DirectoryFull { .. } => 3001,
            Self::FactoryError(_) => 3002,
            Self::ProcessingFailed(_) => 4001,
        }
    }

    /// Returns the HTTP status code used when the error is reported before
    /// the connection was upgraded.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::VerificationFailed(_) => StatusCode::UNAUTHORIZED,
            Self::UpgradeFailed(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyMember { .. } | Self::PoolFull(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DirectoryFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::FactoryError(_) | Self::ProcessingFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the WebSocket close code used when an upgraded connection is
    /// turned away before processing.
    ///
    /// `1013` (try again later) for capacity exhaustion, `1011` (internal
    /// error) otherwise.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            Self::DirectoryFull { .. } | Self::PoolFull(_) => 1013,
            _ => 1011,
        }
    }

    /// Short, static close reason. WebSocket close reasons are capped at
    /// 123 bytes, so the full `Display` text is not used.
    #[must_use]
    pub const fn close_reason(&self) -> &'static str {
        match self {
            Self::VerificationFailed(_) => "verification failed",
            Self::UpgradeFailed(_) => "upgrade failed",
            Self::AlreadyMember { .. } => "already a member",
            Self::NotFound(_) => "not found",
            Self::PoolFull(_) => "pool full",
            Self::DirectoryFull { .. } => "server at capacity",
            Self::FactoryError(_) => "pool unavailable",
            Self::ProcessingFailed(_) => "processing failed",
        }
    }

    /// Returns `true` for errors that only a broken invariant or a caller
    /// bug can produce (`AlreadyMember`, `NotFound`, `PoolFull`).
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::AlreadyMember { .. } | Self::NotFound(_) | Self::PoolFull(_)
        )
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violations_are_flagged() {
        assert!(DispatchError::NotFound(ConnId::new()).is_invariant_violation());
        assert!(
            DispatchError::AlreadyMember {
                conn_id: ConnId::new(),
                pool_id: PoolId::new(),
            }
            .is_invariant_violation()
        );
        assert!(DispatchError::PoolFull(PoolId::new()).is_invariant_violation());

        assert!(!DispatchError::DirectoryFull { max_pools: 1 }.is_invariant_violation());
        assert!(!DispatchError::UpgradeFailed("reset".into()).is_invariant_violation());
        assert!(!DispatchError::ProcessingFailed("boom".into()).is_invariant_violation());
    }

    #[test]
    fn verification_failure_maps_to_unauthorized() {
        let err = DispatchError::VerificationFailed("missing token".into());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_code(), 1001);
        assert_eq!(err.to_string(), "verification failed: missing token");
    }

    #[test]
    fn directory_full_asks_client_to_retry() {
        let err = DispatchError::DirectoryFull { max_pools: 4 };
        assert_eq!(err.close_code(), 1013);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            DispatchError::FactoryError("oom".into()).close_code(),
            1011
        );
    }

    #[test]
    fn close_reasons_fit_in_a_frame() {
        let errors = [
            DispatchError::VerificationFailed("x".into()),
            DispatchError::UpgradeFailed("x".into()),
            DispatchError::NotFound(ConnId::new()),
            DispatchError::PoolFull(PoolId::new()),
            DispatchError::DirectoryFull { max_pools: 1 },
            DispatchError::FactoryError("x".into()),
            DispatchError::ProcessingFailed("x".into()),
        ];
        for err in errors {
            assert!(err.close_reason().len() <= 123);
        }
    }

    #[test]
    fn into_response_uses_status_code() {
        let response = DispatchError::VerificationFailed("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
