use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::api::ApiResponse;

/// Failures of a single store operation.
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    /// The database refused the write: duplicate key or dangling reference.
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// The circuit breaker rejected the call without touching the database.
    #[error("storage unavailable")]
    Unavailable,
}

impl StoreError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Whether the error says something about the health of the database,
    /// as opposed to the request that was made against it.
    pub(crate) fn is_storage_fault(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Unavailable)
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::ForeignKeyViolation,
                info,
            ) => Self::Constraint(info.message().to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Everything a request can fail with once it reaches a handler.
#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A write action arrived on a GET request.
    #[error("{0} must be sent as POST")]
    WriteOverGet(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("worker pool error: {0}")]
    Blocking(String),
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        Self::Blocking(err.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidAction(_) | ApiError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::WriteOverGet(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Store(StoreError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Constraint(_)) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(StoreError::Storage(_)) | ApiError::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::failure(self.to_string()))
    }
}

/// Startup configuration problems. These are fatal.
#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
