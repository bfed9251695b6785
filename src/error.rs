//! Error types for the ILS gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::drivers::DriverError;

/// Numeric error codes carried in error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NotAuthorized = 2,
    NoSuitableBackend = 3,
    BackendFailure = 4,
    BackendConfiguration = 5,
    UnsupportedOperation = 6,
    BadValue = 8,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// No driver is available for the source, or it cannot perform the operation
    #[error("No suitable backend driver found")]
    NoSuitableBackend,

    /// A driver was constructed but its initialisation failed
    #[error("Failed to initialise driver for '{backend}': {message}")]
    DriverInit { backend: String, message: String },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NoSuitableBackend => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::NoSuitableBackend,
                self.to_string(),
            ),
            AppError::DriverInit { backend, message } => {
                tracing::error!("Driver initialisation failed for '{}': {}", backend, message);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorCode::BackendConfiguration,
                    format!("Backend '{}' is unavailable", backend),
                )
            }
            AppError::Driver(DriverError::Unsupported(method)) => (
                StatusCode::NOT_IMPLEMENTED,
                ErrorCode::UnsupportedOperation,
                format!("Operation '{}' is not supported by this backend", method),
            ),
            AppError::Driver(DriverError::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Driver(e) => {
                tracing::error!("Driver error: {}", e);
                (StatusCode::BAD_GATEWAY, ErrorCode::BackendFailure, e.to_string())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
