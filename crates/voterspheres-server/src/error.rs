//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::jobs::JobError;
use crate::service::ServiceError;
use crate::store::StoreError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job queue error: {0}")]
    Job(#[from] JobError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(e) => AppError::Store(e),
            ServiceError::InvalidKey { .. } => AppError::BadRequest(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Store(StoreError::Sqlx(err))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Store(_) | AppError::Job(_) | AppError::Internal(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::Store(ref e) => {
                tracing::error!("Store error: {:?}", e);
                "A database error occurred".to_string()
            }
            AppError::Job(ref e) => {
                tracing::error!("Job queue error: {:?}", e);
                "A job queue error occurred".to_string()
            }
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                "An internal error occurred".to_string()
            }
            AppError::Config(ref message) => {
                tracing::error!("Configuration error: {}", message);
                "Server configuration error".to_string()
            }
            AppError::NotFound(message)
            | AppError::Validation(message)
            | AppError::BadRequest(message) => message,
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = std::result::Result<T, AppError>;
