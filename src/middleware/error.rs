//! Error response formatting
//!
//! Standardized error responses with consistent JSON structure, HTTP status
//! codes, error codes, and user-friendly messages.

use crate::error::{AppError, ErrorCode};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Standardized error response structure returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Request ID for debugging and support
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Whether the client should retry the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: Some(error.is_retryable()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        (status_code, Json(ErrorResponse::from_app_error(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppErrorKind, DomainError};

    #[test]
    fn error_response_carries_code_and_message() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
            order_id: 9,
        }))
        .with_request_id("req-1");

        let response = ErrorResponse::from_app_error(&error);
        assert_eq!(response.error, ErrorCode::OrderNotFound);
        assert_eq!(response.request_id.as_deref(), Some("req-1"));
        assert_eq!(response.retryable, Some(false));
    }
}
