// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{services::verification::Denial, store::StoreError};

/// Errors returned by handlers and services.
///
/// Each variant maps to one HTTP status; the message becomes the `error`
/// field of the JSON body.
#[derive(Debug, Error)]
pub enum AppError {
    /// 500. The message is logged, clients only see a generic text.
    #[error("internal error: {0}")]
    InternalServerError(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// 401
    #[error("unauthorized: {0}")]
    AuthError(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// 409: duplicate keys, or a card busy with a concurrent verification.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A result-checker request was refused; status and message come from the denial.
    #[error("access denied: {}", .0.code())]
    AccessDenied(Denial),
}

/// Renders `{"error": message}` (plus `code` for checker denials).
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::AccessDenied(denial) => {
                let body = Json(json!({
                    "error": denial.message(),
                    "code": denial.code(),
                }));
                return (denial.status(), body).into_response();
            }
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Unique-constraint clashes become 409; every other store failure is a 500.
/// Allows using `?` operator on store calls.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
