//! Application error type mapping to HTTP status codes and envelope format.

use axum::response::{IntoResponse, Response};

use chatrelay_types::error::{AuthError, RelayError, RepositoryError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Missing, invalid, expired or revoked bearer token.
    Unauthorized(String),
    /// Authenticated but not allowed.
    Forbidden(String),
    NotFound(String),
    Validation(String),
    /// No correlated reply before the relay deadline. Retryable.
    Timeout(String),
    /// Bus or session store unavailable.
    Unavailable(String),
    Internal(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Timeout(_) => "RELAY_TIMEOUT",
            AppError::Unavailable(_) => "UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Timeout(msg)
            | AppError::Unavailable(msg)
            | AppError::Internal(msg) => msg,
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated(reason) => AppError::Unauthorized(reason.to_string()),
            AuthError::Store(msg) => AppError::Unavailable(format!("session store: {msg}")),
            AuthError::Signing(msg) => AppError::Internal(msg),
        }
    }
}

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Timeout(_) => AppError::Timeout(e.to_string()),
            RelayError::Bus(_) => AppError::Unavailable(e.to_string()),
            RelayError::Cancelled => AppError::Unavailable("server is shutting down".to_string()),
            RelayError::Encode(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => AppError::NotFound(e.to_string()),
            RepositoryError::Connection => AppError::Unavailable(e.to_string()),
            RepositoryError::Conflict(_) => AppError::Validation(e.to_string()),
            RepositoryError::Query(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(msg) = &self {
            tracing::error!(error = %msg, "request failed");
        }

        ApiResponse::error(self.code(), self.message(), String::new(), 0).into_response()
    }
}
