//! Error types for the Shelfscan server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::scanner::DeviceError;

/// Numeric error codes shared with the lending frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    BadValue = 3,
    ScannerBusy = 4,
    ScanTimeout = 5,
    DeviceFailure = 6,
    ScanCancelled = 7,
    ItemMismatch = 8,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Expired, forged or missing capability token
    #[error("Scan token invalid: {0}")]
    TokenInvalid(String),

    #[error("Scanned item mismatch: {0}")]
    ItemMismatch(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Scan timeout: {0}")]
    ScanTimeout(String),

    #[error("Scan cancelled")]
    ScanCancelled,

    #[error("Device error: {0}")]
    Device(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

/// Status nginx uses for a request the client abandoned
const CLIENT_CLOSED_REQUEST: u16 = 499;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::TokenInvalid(msg) => {
                tracing::debug!("Rejected scan token: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorCode::NotAuthorized,
                    "Please scan the book again to proceed.".to_string(),
                )
            }
            AppError::ItemMismatch(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::ItemMismatch, msg.clone())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, ErrorCode::ScannerBusy, msg.clone())
            }
            AppError::ScanTimeout(msg) => {
                (StatusCode::REQUEST_TIMEOUT, ErrorCode::ScanTimeout, msg.clone())
            }
            AppError::ScanCancelled => {
                let status = StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                    .unwrap_or(StatusCode::NO_CONTENT);
                return status.into_response();
            }
            AppError::Device(msg) => {
                tracing::error!("Device error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DeviceFailure,
                    msg.clone(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
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

impl From<DeviceError> for AppError {
    fn from(error: DeviceError) -> Self {
        if error.is_rejection() {
            AppError::Conflict(error.to_string())
        } else {
            AppError::Device(error.to_string())
        }
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
