//! Room service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Messages
//! for 5xx responses are generic; the underlying error is logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Room service error type.
///
/// Every surfaced failure names the operation that failed. Maps to:
/// - InvalidArgument: 400 Bad Request
/// - NotFound: 404 Not Found
/// - Conflict: 409 Conflict
/// - Provisioning, Deletion, Lookup: 502 Bad Gateway
/// - Signing, Internal: 500 Internal Server Error
/// - Cancelled: 503 Service Unavailable
/// - DeadlineExceeded: 504 Gateway Timeout
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Room provisioning failed: {0}")]
    Provisioning(String),

    #[error("Room deletion failed: {0}")]
    Deletion(String),

    #[error("Room lookup failed: {0}")]
    Lookup(String),

    #[error("Credential signing failed: {0}")]
    Signing(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(&'static str),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            RoomError::InvalidArgument(_) => 400,
            RoomError::NotFound(_) => 404,
            RoomError::Conflict(_) => 409,
            RoomError::Provisioning(_) | RoomError::Deletion(_) | RoomError::Lookup(_) => 502,
            RoomError::Signing(_) | RoomError::Internal(_) => 500,
            RoomError::Cancelled(_) => 503,
            RoomError::DeadlineExceeded(_) => 504,
        }
    }

    /// Bounded label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            RoomError::InvalidArgument(_) => "invalid_argument",
            RoomError::NotFound(_) => "not_found",
            RoomError::Conflict(_) => "conflict",
            RoomError::Provisioning(_) => "provisioning",
            RoomError::Deletion(_) => "deletion",
            RoomError::Lookup(_) => "lookup",
            RoomError::Signing(_) => "signing",
            RoomError::Cancelled(_) => "cancelled",
            RoomError::DeadlineExceeded(_) => "deadline_exceeded",
            RoomError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            RoomError::InvalidArgument(reason) => (
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                reason.clone(),
            ),
            RoomError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            RoomError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            RoomError::Provisioning(err) => {
                tracing::error!(target: "rs.errors", error = %err, "Room provisioning failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "PROVISIONING_FAILED",
                    "Failed to create room".to_string(),
                )
            }
            RoomError::Deletion(err) => {
                tracing::error!(target: "rs.errors", error = %err, "Room deletion failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "DELETION_FAILED",
                    "Failed to delete room".to_string(),
                )
            }
            RoomError::Lookup(err) => {
                tracing::error!(target: "rs.errors", error = %err, "Room lookup failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "LOOKUP_FAILED",
                    "Failed to look up room".to_string(),
                )
            }
            RoomError::Signing(err) => {
                tracing::error!(target: "rs.errors", error = %err, "Credential signing failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SIGNING_FAILED",
                    "Failed to generate access token".to_string(),
                )
            }
            RoomError::Cancelled(op) => {
                tracing::warn!(target: "rs.errors", operation = %op, "Operation cancelled");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "CANCELLED",
                    "Request was cancelled".to_string(),
                )
            }
            RoomError::DeadlineExceeded(op) => {
                tracing::warn!(target: "rs.errors", operation = %op, "Operation deadline exceeded");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "DEADLINE_EXCEEDED",
                    "Request timed out".to_string(),
                )
            }
            RoomError::Internal(err) => {
                tracing::error!(target: "rs.errors", error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
