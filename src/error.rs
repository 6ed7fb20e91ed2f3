use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaError;
use crate::repository::RepoError;

/// Structured error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-stable error kind. One of: `UNAUTHENTICATED`, `INVALID_CREDENTIALS`,
    /// `FORBIDDEN`, `NOT_FOUND`, `CONFLICT`, `INVALID_MEDIA`, `UPLOAD_FAILED`,
    /// `VALIDATION_ERROR`, `INTERNAL_ERROR`.
    #[schema(example = "NOT_FOUND")]
    pub code: String,
    /// Human-readable description.
    #[schema(example = "Blog not found")]
    pub message: String,
}

/// AppError
///
/// Every failure a request can end in. All variants are recovered at the
/// request boundary and rendered as an `ErrorBody`.
#[derive(Debug, Error, PartialEq)]
pub enum AppError {
    /// Missing, invalid or expired credential, or the principal no longer exists.
    #[error("authentication required")]
    Unauthenticated,
    /// Login attempt with an unknown identity or a wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Valid credential, but the principal may not act on this resource.
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidMedia(String),
    #[error("image upload failed: {0}")]
    UploadFailed(String),
    #[error("{0}")]
    Validation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidMedia(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UploadFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::Forbidden => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InvalidMedia(_) => "INVALID_MEDIA",
            AppError::UploadFailed(_) => "UPLOAD_FAILED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();
        let message = match &self {
            AppError::Internal(detail) => {
                // The detail may carry driver output; keep it in the logs only.
                tracing::error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Conflict(field) => AppError::Conflict(format!("{field} already exists")),
            RepoError::Database(detail) => AppError::Internal(detail),
        }
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Invalid(msg) => AppError::InvalidMedia(msg),
            other => AppError::UploadFailed(other.to_string()),
        }
    }
}
