//! Application error types.
//!
//! Every variant except `Config` is local to a single request and is turned
//! into an `{"error": ...}` envelope by the `IntoResponse` impl. Backend
//! details stay in the log; clients only see the generic message.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ErrorBody;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Mediator phase a deadline expired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPhase {
    Connecting,
    Querying,
}

impl std::fmt::Display for BackendPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendPhase::Connecting => write!(f, "connecting"),
            BackendPhase::Querying => write!(f, "querying"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Credential missing or mismatched.
    #[error("unauthorized")]
    Unauthorized,

    /// Backend unreachable, backend authentication rejected, or resource exhaustion.
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    /// The backend rejected or failed the query.
    #[error("query execution failed: {0}")]
    DatabaseQuery(String),

    /// Client exceeded its request budget for the current window.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Connect + query exceeded the configured deadline.
    #[error("backend timed out while {phase}")]
    Timeout { phase: BackendPhase },

    /// Startup misconfiguration. Fatal to the process.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status the error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::DatabaseConnection(_)
            | AppError::DatabaseQuery(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the client-facing envelope.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unauthorized => "Unauthorized".to_string(),
            AppError::RateLimited { .. } => "Too many requests, please try again later.".to_string(),
            AppError::DatabaseConnection(_) => "Database connection failed".to_string(),
            AppError::DatabaseQuery(_) => "Query execution failed".to_string(),
            AppError::Timeout { phase } => format!("Backend timed out while {}", phase),
            AppError::Config(_) | AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }

        let mut response = (status, Json(ErrorBody::new(self.public_message()))).into_response();
        match self {
            AppError::Unauthorized => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            AppError::RateLimited { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            _ => {}
        }
        response
    }
}
