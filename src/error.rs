//! Error handling module
//!
//! Centralized error types and HTTP response conversion. Business failures
//! inside a transaction never pass through here; they come back as a
//! FAILED outcome with a 200. This type covers everything else: malformed
//! requests, lookups that miss, and infrastructure faults.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::audit::AuditError;
use crate::engine::{EngineError, StoreError};
use crate::gateway::GatewayError;
use crate::limits::LimitError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("Transaction with idempotency key {0} is still in progress")]
    TransactionInFlight(Uuid),

    // Collaborator errors
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Limit(#[from] LimitError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidRequest(msg) => AppError::InvalidRequest(msg),
            EngineError::TransactionInFlight(key) => AppError::TransactionInFlight(key),
            EngineError::Store(StoreError::NotFound(id)) => AppError::TransactionNotFound(id),
            EngineError::Store(StoreError::Database(e)) => AppError::Database(e),
            EngineError::Store(e) => AppError::Internal(e.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::InvalidHeader(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_header", Some(msg.clone()))
            }

            // 404 Not Found
            AppError::TransactionNotFound(id) => {
                (StatusCode::NOT_FOUND, "transaction_not_found", Some(id.to_string()))
            }

            // 409 Conflict
            AppError::TransactionInFlight(key) => {
                (StatusCode::CONFLICT, "transaction_in_flight", Some(key.to_string()))
            }

            // Gateway errors - map to appropriate HTTP status
            AppError::Gateway(ref gateway_err) => match gateway_err {
                GatewayError::NotFound(account) => {
                    (StatusCode::NOT_FOUND, "account_not_found", Some(account.clone()))
                }
                GatewayError::Inactive(account) => {
                    (StatusCode::BAD_REQUEST, "account_inactive", Some(account.clone()))
                }
                GatewayError::InsufficientFunds { required, available } => (
                    StatusCode::BAD_REQUEST,
                    "insufficient_funds",
                    Some(format!("required {}, available {}", required, available)),
                ),
                GatewayError::Unavailable(msg) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", Some(msg.clone()))
                }
                GatewayError::Database(e) => {
                    tracing::error!("Gateway database error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
                }
                GatewayError::Internal(msg) => {
                    tracing::error!("Gateway internal error: {}", msg);
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
                }
            },

            AppError::Limit(ref limit_err) => match limit_err {
                LimitError::AmountExceeded { remaining, requested } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "daily_amount_exceeded",
                    Some(format!("remaining {}, requested {}", remaining, requested)),
                ),
                LimitError::CountExceeded { ceiling } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "daily_count_exceeded",
                    Some(format!("ceiling {}", ceiling)),
                ),
                LimitError::Database(e) => {
                    tracing::error!("Limit ledger database error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
                }
            },

            AppError::Audit(AuditError::Database(e)) => {
                tracing::error!("Audit trail database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_mapping() {
        let key = Uuid::new_v4();
        let err: AppError = EngineError::TransactionInFlight(key).into();
        assert!(matches!(err, AppError::TransactionInFlight(k) if k == key));

        let err: AppError = EngineError::InvalidRequest("bad amount".to_string()).into();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
