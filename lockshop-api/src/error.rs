//! Error Types for Lockshop API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct carried from handlers and middleware to the renderer
//! - ErrorCode enum naming the client-visible error type
//! - IntoResponse implementation for Axum HTTP responses
//!
//! Every error body has the shape `{detail, type, timestamp, path}`. The
//! `timestamp` and `path` fields are filled in by the outermost error
//! handling middleware, which is the single place bodies are finalized.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lockshop_core::{ConversionError, StoreError};
use lockshop_storage::BackendError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::auth::TokenError;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error type tags returned in the `type` field of error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    AuthenticationError,

    /// Access token has expired
    TokenExpiredError,

    /// Token is malformed, badly signed, or of the wrong type
    InvalidTokenError,

    /// Authenticated but not allowed
    PermissionDenied,

    // ========================================================================
    // Client Errors (404, 409, 422, 429)
    // ========================================================================
    NotFound,

    Conflict,

    /// Field-level input errors
    ValidationError,

    RateLimitExceeded,

    /// Any other explicit HTTP status
    #[serde(rename = "HTTPException")]
    HttpException,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    DatabaseError,

    InternalServerError,

    ServiceUnavailable,
}

impl ErrorCode {
    /// Default HTTP status for this error type.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::AuthenticationError
            | ErrorCode::TokenExpiredError
            | ErrorCode::InvalidTokenError => StatusCode::UNAUTHORIZED,
            ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::HttpException => StatusCode::BAD_REQUEST,
            ErrorCode::DatabaseError | ErrorCode::InternalServerError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// The tag written to the `type` field.
    pub fn type_tag(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationError => "AuthenticationError",
            ErrorCode::TokenExpiredError => "TokenExpiredError",
            ErrorCode::InvalidTokenError => "InvalidTokenError",
            ErrorCode::PermissionDenied => "PermissionDenied",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::ValidationError => "ValidationError",
            ErrorCode::RateLimitExceeded => "RateLimitExceeded",
            ErrorCode::HttpException => "HTTPException",
            ErrorCode::DatabaseError => "DatabaseError",
            ErrorCode::InternalServerError => "InternalServerError",
            ErrorCode::ServiceUnavailable => "ServiceUnavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Generic detail for 5xx responses. Internal text never leaves the server.
pub const INTERNAL_DETAIL: &str = "Internal server error";

/// Structured API error.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: ErrorCode,

    /// String for most errors; a list of field issues for validation errors.
    pub detail: Value,

    /// Explicit status overriding the code's default.
    pub status: Option<StatusCode>,
}

/// Serialized error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: Value,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: Value::String(detail.into()),
            status: None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or_else(|| self.code.status_code())
    }

    /// Detail rendered as text, for logs.
    pub fn detail_text(&self) -> String {
        match &self.detail {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Body without the request-scoped fields.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            detail: self.detail.clone(),
            kind: self.code.type_tag().to_string(),
            timestamp: None,
            path: None,
        }
    }

    // ========================================================================
    // Authentication Error Constructors
    // ========================================================================

    pub fn unauthenticated(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationError, detail)
    }

    pub fn token_expired() -> Self {
        Self::new(ErrorCode::TokenExpiredError, "Token has expired")
    }

    pub fn invalid_token(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidTokenError, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, detail)
    }

    pub fn admin_required() -> Self {
        Self::forbidden("Admin privileges required")
    }

    // ========================================================================
    // Client Error Constructors
    // ========================================================================

    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} {} not found", entity, id))
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, detail)
    }

    /// Validation error with a list of `{loc, msg, type}` issues.
    pub fn validation(issues: Vec<Value>) -> Self {
        Self {
            code: ErrorCode::ValidationError,
            detail: Value::Array(issues),
            status: None,
        }
    }

    /// Validation error for a single body field.
    pub fn invalid_field(field: &str, msg: impl Into<String>) -> Self {
        Self::validation(vec![field_issue(Some(field), &msg.into(), "value_error")])
    }

    pub fn rate_limited() -> Self {
        Self::new(ErrorCode::RateLimitExceeded, "Too many requests")
    }

    /// Explicit-status error rendered with the `HTTPException` type.
    pub fn http(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::HttpException,
            detail: Value::String(detail.into()),
            status: Some(status),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::http(StatusCode::BAD_REQUEST, detail)
    }

    // ========================================================================
    // Server Error Constructors
    // ========================================================================

    pub fn database_error() -> Self {
        Self::new(ErrorCode::DatabaseError, INTERNAL_DETAIL)
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalServerError, INTERNAL_DETAIL)
    }

    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, detail)
    }
}

/// One FastAPI-style validation issue.
pub fn field_issue(field: Option<&str>, msg: &str, kind: &str) -> Value {
    let mut loc = vec![Value::String("body".to_string())];
    if let Some(field) = field {
        loc.push(Value::String(field.to_string()));
    }
    serde_json::json!({ "loc": loc, "msg": msg, "type": kind })
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.detail_text())
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Renders `{detail, type}` and stashes the error in the response extensions
/// so the error handling stage can finish the body.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self.body())).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

// ============================================================================
// CONVERSIONS FROM LOWER-LEVEL ERRORS
// ============================================================================

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => ApiError::not_found(entity, id),
            StoreError::Conflict { entity, reason } => {
                ApiError::conflict(format!("{} conflict: {}", entity, reason))
            }
            StoreError::InsufficientBalance { currency, .. } => {
                ApiError::bad_request(format!("Insufficient {} balance", currency))
            }
            StoreError::Timeout => {
                tracing::error!("Record store operation timed out");
                ApiError::internal()
            }
            other => {
                tracing::error!(error = %other, "Record store error");
                ApiError::database_error()
            }
        }
    }
}

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Full error stays in the logs
        tracing::error!("Database error: {:?}", err);
        ApiError::database_error()
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                ApiError::service_unavailable("Database connection pool exhausted")
            }
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error(),
        }
    }
}

/// Serialization faults inside the server are internal.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::internal()
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidPattern { pattern, reason } => {
                ApiError::bad_request(format!("Invalid pattern '{}': {}", pattern, reason))
            }
            other => {
                tracing::error!(error = %other, "Backend error");
                ApiError::service_unavailable("Backend unavailable")
            }
        }
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::MissingRate(_) => ApiError::service_unavailable(err.to_string()),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::token_expired(),
            TokenError::Malformed(reason) => {
                tracing::debug!(reason = %reason, "Rejected malformed token");
                ApiError::invalid_token("Invalid token")
            }
            TokenError::WrongType { expected, .. } => {
                ApiError::invalid_token(format!("Expected {} token", expected))
            }
            TokenError::Signing(reason) => {
                tracing::error!(reason = %reason, "Token signing failed");
                ApiError::internal()
            }
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(
            ErrorCode::AuthenticationError.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::TokenExpiredError.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ErrorCode::PermissionDenied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::ValidationError.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::ServiceUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_http_exception_keeps_explicit_status() {
        let err = ApiError::http(StatusCode::PAYLOAD_TOO_LARGE, "too big");
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.body().kind, "HTTPException");
    }

    #[test]
    fn test_store_backend_errors_are_generic() {
        let err: ApiError = StoreError::backend("relation \"users\" does not exist").into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.detail, Value::String(INTERNAL_DETAIL.to_string()));

        let err: ApiError = StoreError::Timeout.into();
        assert_eq!(err.code, ErrorCode::InternalServerError);
    }

    #[test]
    fn test_store_client_errors_map_precisely() {
        let err: ApiError = StoreError::not_found("product", "DL").into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.detail_text(), "product DL not found");

        let err: ApiError = StoreError::InsufficientBalance {
            growid: "A".to_string(),
            currency: "wl".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code, ErrorCode::HttpException);
    }

    #[test]
    fn test_validation_detail_is_issue_list() {
        let err = ApiError::invalid_field("price", "must be positive");
        let body = err.body();
        assert_eq!(body.kind, "ValidationError");
        assert_eq!(body.detail[0]["loc"][1], "price");
        assert_eq!(body.detail[0]["msg"], "must be positive");
    }

    #[test]
    fn test_into_response_keeps_error_in_extensions() {
        let response = ApiError::token_expired().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let stored = response.extensions().get::<ApiError>().map(|e| e.code);
        assert_eq!(stored, Some(ErrorCode::TokenExpiredError));
    }

    #[test]
    fn test_error_code_serializes_type_tag() -> Result<(), serde_json::Error> {
        assert_eq!(
            serde_json::to_string(&ErrorCode::HttpException)?,
            "\"HTTPException\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::DatabaseError)?,
            "\"DatabaseError\""
        );
        Ok(())
    }
}
