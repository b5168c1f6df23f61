//! Bridge error types with HTTP status code mapping.
//!
//! [`BridgeError`] is the central error type. Most variants describe a
//! caller contract violation on a [`crate::socket::LogicalSocket`] or on the
//! upgrade capability; when one escapes a request handler it renders as a
//! structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::socket::ReadyState;
use crate::upgrade::AttemptId;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "request is not a websocket upgrade attempt"
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
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Crate-wide error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                 |
/// |-----------|-------------------|-----------------------------|
/// | 1000–1999 | Request           | 426 Upgrade Required        |
/// | 2000–2999 | Socket contract   | 500 Internal Server Error   |
/// | 3000–3999 | Transport / data  | 500 / 502                   |
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The request was not routed through the upgrade dispatcher.
    #[error("request is not a websocket upgrade attempt")]
    NotAnUpgrade,

    /// `upgrade_websocket()` was called more than once in one attempt.
    #[error("upgrade already requested for attempt {0}")]
    UpgradeAlreadyRequested(AttemptId),

    /// The logical socket already has a transport bound to it.
    #[error("logical socket {0} is already attached")]
    AlreadyAttached(uuid::Uuid),

    /// `send` or `close` was called before the socket was attached.
    #[error("logical socket is not attached to a transport")]
    NotAttached,

    /// The physical transport refused the operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Blob data could not be materialized.
    #[error("blob conversion failed: {0}")]
    Blob(#[from] BlobError),

    /// No tokio runtime was available to drive an asynchronous send.
    #[error("no async runtime available for queued sends")]
    NoRuntime,

    /// The send pipeline went away before a queued frame was delivered.
    #[error("send pipeline dropped before delivery")]
    DeliveryDropped,
}

impl BridgeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::NotAnUpgrade => 1001,
            Self::UpgradeAlreadyRequested(_) => 2001,
            Self::AlreadyAttached(_) => 2002,
            Self::NotAttached => 2003,
            Self::Transport(_) => 3001,
            Self::Blob(_) => 3002,
            Self::NoRuntime => 3003,
            Self::DeliveryDropped => 3004,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotAnUpgrade => StatusCode::UPGRADE_REQUIRED,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::UpgradeAlreadyRequested(_)
            | Self::AlreadyAttached(_)
            | Self::NotAttached
            | Self::Blob(_)
            | Self::NoRuntime
            | Self::DeliveryDropped => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
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

/// Failures reported by a physical transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport is not in the `Open` state.
    #[error("transport is not open (state: {0})")]
    NotOpen(ReadyState),

    /// The transport's writer task has shut down.
    #[error("transport writer has shut down")]
    WriterClosed,
}

/// Failure to materialize blob data into a binary buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BlobError {
    message: String,
}

impl BlobError {
    /// Creates a blob error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn not_an_upgrade_maps_to_426() {
        let err = BridgeError::NotAnUpgrade;
        assert_eq!(err.status_code(), StatusCode::UPGRADE_REQUIRED);
        assert_eq!(err.error_code(), 1001);
    }

    #[test]
    fn transport_error_converts_and_maps_to_502() {
        let err: BridgeError = TransportError::NotOpen(ReadyState::Closed).into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            err.to_string(),
            "transport error: transport is not open (state: CLOSED)"
        );
    }

    #[test]
    fn into_response_uses_status_code() {
        let response = BridgeError::NotAttached.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn blob_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = BlobError::from(io);
        assert_eq!(err.to_string(), "missing");
    }
}
