// ABOUTME: API module containing the HTTP handler functions for readmark.
// ABOUTME: Organized into user registration, progress sync, and web UI document endpoints, sharing one error type.

pub mod documents;
pub mod syncs;
pub mod users;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use readmark_store::StoreError;
use thiserror::Error;

/// Errors returned by handlers. Each variant maps onto one status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("registration is disabled")]
    RegistrationDisabled,

    #[error("{0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RegistrationDisabled => StatusCode::PAYMENT_REQUIRED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::DuplicateUser(_)) => StatusCode::CONFLICT,
            ApiError::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // The change is still in memory; the next successful write will carry it.
            tracing::error!("request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}
