use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::{db::DbError, storage::StorageError};

/// Errors surfaced to API callers
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Insufficient token balance: {balance} available, {required} required")]
    InsufficientBalance { balance: i64, required: i64 },
    #[error("Missing account identity")]
    Unauthenticated,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::InsufficientBalance { .. } => "insufficient_balance",
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::InvalidState(_) => "invalid_state",
            ServiceError::InvalidSignature(_) => "invalid_signature",
            ServiceError::InvalidInput(_) => "invalid_request_error",
            ServiceError::StorageUnavailable(_) => "storage_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InsufficientBalance { .. }
            | ServiceError::InvalidState(_)
            | ServiceError::InvalidInput(_)
            | ServiceError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a caller. Infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::StorageUnavailable(_) => "Storage is temporarily unavailable".to_string(),
            ServiceError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::InsufficientBalance {
                balance, requested, ..
            } => ServiceError::InsufficientBalance {
                balance,
                required: requested,
            },
            DbError::AccountNotFound(id) => ServiceError::NotFound(format!("Account {}", id)),
            DbError::RenderJobNotFound(id) => ServiceError::NotFound(format!("Render job {}", id)),
            DbError::InvalidTransition { .. } => ServiceError::InvalidState(e.to_string()),
            DbError::ConnectionError(_) => ServiceError::StorageUnavailable(e.to_string()),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidPayload(_) | StorageError::InvalidKey(_) => {
                ServiceError::InvalidInput(e.to_string())
            }
            StorageError::Io(_) => ServiceError::StorageUnavailable(e.to_string()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        }
        (
            status,
            Json(serde_json::json!({
                "error": {
                    "type": self.error_type(),
                    "message": self.public_message(),
                }
            })),
        )
            .into_response()
    }
}
