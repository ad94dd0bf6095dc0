use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::ProviderError { retryable, .. } => *retryable,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::NetworkError { .. } => 503,
            PaymentError::ProviderError { .. } => 502,
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        match err {
            PaymentError::ValidationError { message, field } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    reason: message,
                }))
            }
            other => {
                let retryable = other.is_retryable();
                AppError::new(AppErrorKind::External(ExternalError::PaymentProvider {
                    provider: "paypay".to_string(),
                    message: other.to_string(),
                    is_retryable: retryable,
                }))
            }
        }
    }
}
