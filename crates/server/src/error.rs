//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    /// User-correctable input problem. The message is shown as is.
    #[error("{0}")]
    Validation(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] lorry_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] lorry_metadata::MetadataError),

    #[error("{0}")]
    Core(#[from] lorry_core::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal_error",
            Self::Storage(lorry_storage::StorageError::NotFound(_)) => "not_found",
            Self::Storage(_) => "storage_error",
            Self::Metadata(lorry_metadata::MetadataError::NotFound(_)) => "not_found",
            Self::Metadata(lorry_metadata::MetadataError::Constraint(_)) => "validation_error",
            Self::Metadata(lorry_metadata::MetadataError::AlreadyExists(_)) => "conflict",
            Self::Metadata(_) => "metadata_error",
            Self::Core(lorry_core::Error::InvalidId(_)) => "not_found",
            Self::Core(lorry_core::Error::Validation(_)) => "validation_error",
            Self::Core(_) => "bad_request",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                lorry_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                lorry_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                lorry_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                lorry_metadata::MetadataError::Constraint(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            // Malformed ids read as unknown ids.
            Self::Core(lorry_core::Error::InvalidId(_)) => StatusCode::NOT_FOUND,
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether the caller can fix this by changing the request.
    pub fn is_validation(&self) -> bool {
        self.code() == "validation_error"
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
