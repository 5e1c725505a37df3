//! Error types for RPC call execution
//!
//! # Error Codes
//!
//! Error codes are represented by the [`ErrorCode`] enum, a closed set of
//! variants each carrying a default HTTP-like status. When serialized, codes
//! are converted to SCREAMING_SNAKE_CASE strings for compatibility.
//!
//! # Example
//! ```rust,ignore
//! use rpc_dispatch::{RpcError, ErrorCode};
//!
//! let error = RpcError::new(ErrorCode::NotFound, "User not found");
//! let error = RpcError::not_found("User not found"); // Convenience method
//! ```

use crate::validator::Issue;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of error codes for RPC operations.
///
/// Each code maps to a default numeric status. An [`RpcError`] may override
/// the status, except for the built-in validation codes which the framework
/// always emits with their fixed status.
///
/// When serialized to JSON, codes are converted to SCREAMING_SNAKE_CASE
/// (e.g., `NotFound` becomes `"NOT_FOUND"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Client errors (4xx equivalent)
    /// The request was malformed or invalid
    BadRequest,
    /// Authentication is required
    Unauthorized,
    /// The authenticated user lacks permission
    Forbidden,
    /// The requested resource or procedure was not found
    NotFound,
    /// The procedure does not accept the requested method
    MethodNotSupported,
    /// The call did not complete in time
    Timeout,
    /// The request conflicts with current state
    Conflict,
    /// A precondition of the request failed
    PreconditionFailed,
    /// The request payload exceeds size limits
    PayloadTooLarge,
    /// The payload encoding is not supported
    UnsupportedMediaType,
    /// The payload was understood but cannot be processed
    UnprocessableContent,
    /// The caller is being rate limited
    TooManyRequests,
    /// The client went away before the call completed
    ClientClosedRequest,

    // Server errors (5xx equivalent)
    /// An unexpected internal error occurred
    InternalServerError,
    /// A declared procedure has no implementation
    NotImplemented,
    /// An upstream collaborator misbehaved
    BadGateway,
    /// The service is temporarily unavailable
    ServiceUnavailable,
    /// An upstream collaborator timed out
    GatewayTimeout,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            Self::Timeout => "TIMEOUT",
            Self::Conflict => "CONFLICT",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::UnprocessableContent => "UNPROCESSABLE_CONTENT",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::BadGateway => "BAD_GATEWAY",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::GatewayTimeout => "GATEWAY_TIMEOUT",
        }
    }

    /// Returns the default numeric status for this code.
    pub fn default_status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotSupported => 405,
            Self::Timeout => 408,
            Self::Conflict => 409,
            Self::PreconditionFailed => 412,
            Self::PayloadTooLarge => 413,
            Self::UnsupportedMediaType => 415,
            Self::UnprocessableContent => 422,
            Self::TooManyRequests => 429,
            Self::ClientClosedRequest => 499,
            Self::InternalServerError => 500,
            Self::NotImplemented => 501,
            Self::BadGateway => 502,
            Self::ServiceUnavailable => 503,
            Self::GatewayTimeout => 504,
        }
    }

    /// Returns true if this is a client error (4xx equivalent).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.default_status())
    }

    /// Returns true if this is a server error (5xx equivalent).
    pub fn is_server_error(&self) -> bool {
        self.default_status() >= 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RPC error with type-safe code, status, message and structured payload.
///
/// The serialized shape is what a transport adapter forwards to callers:
/// `code`, `status`, `message`, optional `data`, optional `cause`.
///
/// # Example
/// ```rust,ignore
/// use rpc_dispatch::{RpcError, ErrorCode};
///
/// let error = RpcError::new(ErrorCode::Conflict, "Username taken")
///     .with_data(serde_json::json!({"field": "username"}))
///     .with_cause("unique constraint violation");
/// assert_eq!(error.status(), 409);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct RpcError {
    /// Type-safe error code
    pub code: ErrorCode,
    /// Explicit status override; `None` falls back to the code default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Human-readable error message
    pub message: String,
    /// Optional structured payload (validated against the procedure's error
    /// map for declared errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Optional cause for debugging (not exposed to clients in production)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl RpcError {
    /// Create a new error with code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: None,
            message: message.into(),
            data: None,
            cause: None,
        }
    }

    /// The effective status: the explicit override, or the code's default.
    pub fn status(&self) -> u16 {
        self.status.unwrap_or_else(|| self.code.default_status())
    }

    /// Override the status.
    ///
    /// Overrides are ignored by the framework-emitted validation errors,
    /// whose status is fixed by construction.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a structured payload.
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    /// Attach a cause string for debugging.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Sanitize error for client response (removes internal detail for
    /// server-side errors).
    pub fn sanitize(mut self) -> Self {
        if matches!(self.code, ErrorCode::InternalServerError) {
            self.message = "An internal error occurred".to_string();
            self.data = None;
            self.cause = None;
        }
        self
    }

    /// Wrap an arbitrary failure as `INTERNAL_SERVER_ERROR`, preserving the
    /// original as `cause`. This is the boundary normalization for values
    /// that are not declared, typed errors.
    pub fn from_unexpected(cause: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalServerError, "Internal server error")
            .with_cause(cause.to_string())
    }

    /// Input validation failure: fixed `BAD_REQUEST` carrying the validator's
    /// structured issues as `data`.
    pub fn input_validation(issues: Vec<Issue>) -> Self {
        Self::new(ErrorCode::BadRequest, "Input validation failed")
            .with_data(serde_json::json!({ "issues": issues }))
    }

    /// Output validation failure: fixed `INTERNAL_SERVER_ERROR`. Issue detail
    /// goes to `cause` for logging, never to the client-facing `data`.
    pub fn output_validation(issues: Vec<Issue>) -> Self {
        let detail = serde_json::to_string(&issues).unwrap_or_else(|_| format!("{issues:?}"));
        Self::new(ErrorCode::InternalServerError, "Output validation failed").with_cause(detail)
    }

    // Convenience constructors

    /// Create a NOT_FOUND error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Create a BAD_REQUEST error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Create an UNAUTHORIZED error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Create a FORBIDDEN error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Create a TIMEOUT error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Create a CONFLICT error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Create an INTERNAL_SERVER_ERROR error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    /// Create a NOT_IMPLEMENTED error.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, message)
    }

    /// Create a SERVICE_UNAVAILABLE error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_unexpected(format!("JSON error: {err}"))
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for RpcError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::from_unexpected(err)
    }
}

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;
