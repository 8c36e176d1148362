//! Relay error types.
//!
//! [`RelayError`] covers the HTTP-facing surface (upgrade gating and the
//! REST views) and maps each variant to a status code and structured JSON
//! body. [`SessionError`] records why a single WebSocket session ended; it
//! never leaves the task that owns the session. [`ConfigError`] is raised
//! at startup only.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "room not found: lobby",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// HTTP-facing error enum with status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status               |
/// |-----------|-----------------|---------------------------|
/// | 1000–1999 | Admission       | 401 Unauthorized / 403 Forbidden |
/// | 2000–2999 | Not Found       | 404 Not Found             |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The request's `Origin` header is not on the allow-list.
    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    /// The upgrade request carried no token, or an invalid one.
    #[error("missing or invalid upgrade token")]
    Unauthorized,

    /// No open room with the given name.
    #[error("room not found: {0}")]
    RoomNotFound(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Unauthorized => 1001,
            Self::OriginRejected(_) => 1002,
            Self::RoomNotFound(_) => 2001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::OriginRejected(_) => StatusCode::FORBIDDEN,
            Self::RoomNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Reason a WebSocket session ended.
///
/// Every variant ends the session; the only cross-session effect of any of
/// them is the `userleave` broadcast to the room the connection had joined.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Peer went away, closed normally, or dropped the socket.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The read half failed with something other than an ordinary close.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Unknown message type, out-of-order message, or malformed envelope.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid token, name/room too short, duplicate auth or join.
    #[error("admission denied: {0}")]
    AdmissionDenied(String),

    /// Too many inbound frames in the current window.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The connection was closed from outside the read loop: a handshake
    /// deadline elapsed or the writer could not reach the peer.
    #[error("connection force-closed")]
    ForceClosed,

    /// The client sent `userleave` after joining.
    #[error("client left the room")]
    ExplicitLeave,
}

impl SessionError {
    /// Returns `true` for outcomes caused by client misbehaviour.
    ///
    /// Used to pick the log level when the session ends.
    #[must_use]
    pub const fn is_fatal_violation(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation(_) | Self::AdmissionDenied(_) | Self::RateLimited
        )
    }
}

/// Startup configuration failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set but unusable.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
