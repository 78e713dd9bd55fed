// ABOUTME: User API handlers for registration and credential checks.
// ABOUTME: Registration honors the store's disable_registration flag; the auth check relies on the auth layer.

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::app_state::SharedState;
use crate::auth::AuthenticatedUser;

/// Request body for registering a user.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub username: String,
}

/// POST /users/create - Register a new user.
pub async fn create_user(
    State(state): State<SharedState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), ApiError> {
    if state.store.config().await.disable_registration {
        tracing::info!(user = %req.username, "rejected registration, registration is disabled");
        return Err(ApiError::RegistrationDisabled);
    }
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("username and password are required"));
    }

    state.store.add_user(&req.username, &req.password).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            username: req.username,
        }),
    ))
}

/// GET /users/auth - Confirm the credentials in the auth headers.
pub async fn auth_user(
    Extension(AuthenticatedUser(username)): Extension<AuthenticatedUser>,
) -> Json<serde_json::Value> {
    tracing::debug!(user = %username, "credentials confirmed");
    Json(serde_json::json!({ "authorized": "OK" }))
}
