use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::models::response::ApiResponse;
use crate::store::StoreError;

/// Application-level error type. Every variant renders the response envelope
/// with `success = false`.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Unauthorized,
    NotFound(String),
    MethodNotAllowed(String),
    Conflict(String),
    Unavailable(String),
    /// The store changed but the matching event was not published.
    /// `record` is the saved record, or `None` after a delete.
    EventNotPublished {
        message: String,
        record: Option<Value>,
    },
    /// The request did not finish within `server.request_timeout_secs`.
    Timeout,
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) | AppError::EventNotPublished { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Timeout => StatusCode::REQUEST_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_body(self) -> ApiResponse<Value> {
        match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::MethodNotAllowed(msg)
            | AppError::Conflict(msg) => ApiResponse::failure(msg, None),
            AppError::Timeout => ApiResponse::failure("Request timed out", None),
            AppError::Unauthorized => ApiResponse::failure("Missing or invalid API key", None),
            AppError::Unavailable(detail) => {
                tracing::warn!("Dependency unavailable: {}", detail);
                ApiResponse::failure("Service temporarily unavailable", None)
            }
            AppError::EventNotPublished { message, record } => {
                ApiResponse::failure(message, record)
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                ApiResponse::failure("An unexpected error occurred", None)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self.into_body())).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => AppError::Conflict(err.to_string()),
            StoreError::NotFound(_) => AppError::NotFound(err.to_string()),
            StoreError::Unavailable(e) => AppError::Unavailable(e.to_string()),
            StoreError::Database(e) => AppError::Internal(e.to_string()),
        }
    }
}
