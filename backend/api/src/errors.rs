//! Application-wide error types and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use foodshare_core::{Denied, LifecycleError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Lifecycle(e) => match e {
                LifecycleError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
                LifecycleError::Authorization(Denied::Unauthenticated) => {
                    (StatusCode::UNAUTHORIZED, "authorization")
                }
                LifecycleError::Authorization(_) => (StatusCode::FORBIDDEN, "authorization"),
                LifecycleError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                LifecycleError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                LifecycleError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "invalid_transition")
                }
                LifecycleError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store"),
            },
            ApiError::Database(_) | ApiError::Migrate(_) | ApiError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            tracing::error!("{self}");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                kind,
            }),
        )
            .into_response()
    }
}
