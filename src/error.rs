// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Business-rule failures and faults share one type so services can use `?`
/// end to end; the HTTP layer decides the status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // 404 Not Found
    NotFound(String),

    // 403 Forbidden (ownership or role mismatch)
    Forbidden(String),

    // 409 Conflict: attempt already submitted
    AlreadySubmitted(String),

    // 400 Bad Request: exam duration elapsed
    TimeExpired(String),

    // 400 Bad Request: start-exam preconditions failed
    NotEligible(String),

    // 409 Conflict (e.g., delete blocked by children or question links)
    Conflict(String),

    // 400 Bad Request: would break a tree or state-machine invariant
    InvalidOperation(String),

    // 400 Bad Request: payload validation
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 503 Service Unavailable: storage failure
    Unavailable(String),

    // 500 Internal Server Error
    InternalServerError(String),
}

impl AppError {
    /// The human-readable reason carried by every variant.
    pub fn message(&self) -> &str {
        match self {
            AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::AlreadySubmitted(msg)
            | AppError::TimeExpired(msg)
            | AppError::NotEligible(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidOperation(msg)
            | AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Unavailable(msg)
            | AppError::InternalServerError(msg) => msg,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::AlreadySubmitted(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TimeExpired(_)
            | AppError::NotEligible(_)
            | AppError::InvalidOperation(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into the `{success, message, data}` envelope with the
/// matching HTTP status code. Fault details stay in the logs.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            AppError::Unavailable(msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                "Service temporarily unavailable".to_string()
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.message().to_string(),
        };
        let body = Json(json!({
            "success": false,
            "message": message,
            "data": null,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::Unavailable`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_failures_map_to_client_errors() {
        assert_eq!(
            AppError::NotEligible("exam has not started".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::AlreadySubmitted("already submitted".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Forbidden("not yours".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn storage_failures_map_to_unavailable() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AppError::Unavailable(_)));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
