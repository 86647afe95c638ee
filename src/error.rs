//! Domain error types for the join manager service.
//!
//! Uses thiserror for ergonomic error handling with automatic Display
//! implementations, folded into the HTTP layer via `ResponseError`.

use actix_web::{HttpResponse, ResponseError};
use std::fmt;

use crate::join::error::JoinError;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The identifier supplied by the caller is not a valid UUID.
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// No join source matches the requested (collection, id).
    #[error("{0} not found")]
    NotFound(String),

    /// The join source's index entry exists but its backing file is gone.
    #[error("Join source file missing: {0}")]
    MissingFile(String),

    /// Invalid input supplied on the write path (ingest options, multipart shape).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem or index I/O failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_code, response_message) = match self {
            AppError::InvalidId(_) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "INVALID_ID",
                self.to_string(),
            ),
            AppError::NotFound(_) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                self.to_string(),
            ),
            AppError::MissingFile(_) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "MISSING_FILE",
                self.to_string(),
            ),
            AppError::InvalidInput(_) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                self.to_string(),
            ),
            AppError::Io(err_str) => {
                tracing::error!("I/O error: {}", err_str);
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "IO_ERROR",
                    "An internal storage error occurred".to_string(),
                )
            }
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: error_code.to_string(),
            message: response_message,
        })
    }
}

/// Error response body.
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

impl From<JoinError> for AppError {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::InvalidId(msg) => AppError::InvalidId(msg),
            JoinError::NotFound(msg) => AppError::NotFound(msg),
            JoinError::MissingFile(msg) => AppError::MissingFile(msg),
            JoinError::MissingOption(_)
            | JoinError::InvalidOption(_)
            | JoinError::UnknownJoinKey(_)
            | JoinError::CsvShape(_)
            | JoinError::EmptyKey(_)
            | JoinError::DuplicateKey(_)
            | JoinError::CollectionKeyNotInProvider(_)
            | JoinError::ContentType(_)
            | JoinError::ProviderKind(_) => AppError::InvalidInput(err.to_string()),
            JoinError::Io(msg) => AppError::Io(msg),
        }
    }
}
