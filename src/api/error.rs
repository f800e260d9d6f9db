use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::account::AccountError;
use crate::domain::order::OrderError;
use crate::domain::review::ReviewError;
use crate::store::StoreError;

// ============================================================================
// API Errors - every failure leaves the service as `{error, message}` JSON
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub http_code: StatusCode,
    pub body: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ErrorBody {
    /// Stable error name, e.g. `OutOfStock`
    pub error: String,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.body.error, self.body.message)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn new(http_code: StatusCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            http_code,
            body: ErrorBody {
                error: error.into(),
                message: message.into(),
            },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "ValidationError", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", message)
    }

    pub fn not_found(error: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error, message)
    }

    /// Details are logged, never sent to the client
    pub fn internal(cause: impl fmt::Display) -> Self {
        tracing::error!(error = %cause, "Request failed with an internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "internal server error")
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.http_code).json(&self.body)
    }

    fn status_code(&self) -> StatusCode {
        self.http_code
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(detail) => Self::new(StatusCode::CONFLICT, "Conflict", detail),
            other => Self::internal(other),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        let status = match err {
            OrderError::Store(store) => return store.into(),
            OrderError::ProductNotFound(_)
            | OrderError::OutOfStock { .. }
            | OrderError::InvalidAddress(_)
            | OrderError::InvalidPaymentMethod(_)
            | OrderError::InvalidTransition { .. }
            | OrderError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderError::Forbidden => StatusCode::FORBIDDEN,
            OrderError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        let status = match err {
            ReviewError::Store(store) => return store.into(),
            ReviewError::Validation(_) => StatusCode::BAD_REQUEST,
            ReviewError::NotEligible(_) | ReviewError::Forbidden => StatusCode::FORBIDDEN,
            ReviewError::ProductNotFound(_) | ReviewError::ReviewNotFound(_) => StatusCode::NOT_FOUND,
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            invalid @ AccountError::InvalidLastFour(_) => Self::validation(invalid.to_string()),
            AccountError::Store(store) => store.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
