//! Unified error handling for the storefront backend
//!
//! Layer-specific errors (database, payments, reconciliation) roll up into a
//! single `AppError` carrying an HTTP status, a machine-readable code, and a
//! user-facing message.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::services::reconciler::ReconcileError;

/// Error codes for programmatic client handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "PRODUCT_NOT_FOUND")]
    ProductNotFound,
    #[serde(rename = "RECORD_NOT_FOUND")]
    RecordNotFound,
    #[serde(rename = "MALFORMED_WEBHOOK")]
    MalformedWebhook,
    #[serde(rename = "UNSUPPORTED_PAYMENT_METHOD")]
    UnsupportedPaymentMethod,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 504)
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Order with the given id doesn't exist
    OrderNotFound { order_id: i64 },
    /// Product with the given id doesn't exist
    ProductNotFound { product_id: i64 },
    /// Some other row is missing
    RecordNotFound { entity: String, id: String },
    /// Webhook payload is missing a required field or is unparseable
    MalformedWebhook { reason: String },
    /// Checkout requested a payment method the storefront doesn't support
    UnsupportedPaymentMethod { method: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// External service errors (the payment gateway)
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    Timeout {
        service: String,
        timeout_secs: u64,
    },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidField { field: String, reason: String },
    MissingField { field: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => 404,
                DomainError::ProductNotFound { .. } => 404,
                DomainError::RecordNotFound { .. } => 404,
                DomainError::MalformedWebhook { .. } => 400,
                DomainError::UnsupportedPaymentMethod { .. } => 400,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => 502,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => ErrorCode::OrderNotFound,
                DomainError::ProductNotFound { .. } => ErrorCode::ProductNotFound,
                DomainError::RecordNotFound { .. } => ErrorCode::RecordNotFound,
                DomainError::MalformedWebhook { .. } => ErrorCode::MalformedWebhook,
                DomainError::UnsupportedPaymentMethod { .. } => {
                    ErrorCode::UnsupportedPaymentMethod
                }
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => ErrorCode::PaymentProviderError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { order_id } => {
                    format!("Order {} not found", order_id)
                }
                DomainError::ProductNotFound { product_id } => {
                    format!("Product {} not found", product_id)
                }
                DomainError::RecordNotFound { entity, id } => {
                    format!("{} '{}' not found", entity, id)
                }
                DomainError::MalformedWebhook { reason } => reason.clone(),
                DomainError::UnsupportedPaymentMethod { method } => {
                    format!("Unsupported payment method: {}", method)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider {
                    provider,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment provider ({}) is temporarily unavailable. Please try again",
                            provider
                        )
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { is_retryable, .. } => *is_retryable,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let kind = match err.kind {
            DatabaseErrorKind::NotFound { entity, id } => {
                AppErrorKind::Domain(DomainError::RecordNotFound { entity, id })
            }
            other => AppErrorKind::Infrastructure(InfrastructureError::Database {
                is_retryable: matches!(&other, DatabaseErrorKind::Connection { .. }),
                message: other.to_string(),
            }),
        };
        AppError::new(kind)
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::OrderNotFound(order_id) => {
                AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound { order_id }))
            }
            ReconcileError::MalformedPayload(reason) => {
                AppError::new(AppErrorKind::Domain(DomainError::MalformedWebhook { reason }))
            }
            ReconcileError::Storage(db) => db.into(),
        }
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_not_found_maps_to_404() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
            order_id: 55,
        }));
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::OrderNotFound);
        assert!(error.user_message().contains("55"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn malformed_webhook_maps_to_400() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::MalformedWebhook {
            reason: "Missing merchant_order_id".to_string(),
        }));
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::MalformedWebhook);
        assert_eq!(error.user_message(), "Missing merchant_order_id");
    }

    #[test]
    fn provider_error_maps_to_502() {
        let error = AppError::new(AppErrorKind::External(ExternalError::PaymentProvider {
            provider: "paypay".to_string(),
            message: "upstream 500".to_string(),
            is_retryable: true,
        }));
        assert_eq!(error.status_code(), 502);
        assert_eq!(error.error_code(), ErrorCode::PaymentProviderError);
        assert!(error.is_retryable());
    }

    #[test]
    fn database_not_found_converts_to_domain_404() {
        let error: AppError = DatabaseError::not_found("Order", 7).into();
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::RecordNotFound);
    }
}
