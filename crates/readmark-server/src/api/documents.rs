// ABOUTME: Web UI API handlers for browsing a user's documents and renaming them.
// ABOUTME: Lists every document with its reading history and sets the display name shown in the UI.

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use readmark_core::Document;
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::app_state::SharedState;
use crate::auth::AuthenticatedUser;

/// One document with its history, as listed by `/api/documents.all`.
#[derive(Debug, Serialize)]
pub struct DocumentEntry {
    pub id: String,
    #[serde(flatten)]
    pub document: Document,
    pub document_history: Vec<Document>,
}

#[derive(Debug, Deserialize)]
pub struct PrettyNameRequest {
    pub pretty_name: String,
}

/// GET /api/documents.all - Every document of the caller, ordered by id.
pub async fn list_documents(
    State(state): State<SharedState>,
    Extension(AuthenticatedUser(username)): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<DocumentEntry>>, ApiError> {
    let documents = state.store.list_documents(&username).await?;

    let entries = documents
        .into_iter()
        .map(|(document, history)| DocumentEntry {
            id: document.document_id.clone(),
            document,
            document_history: history.document_history,
        })
        .collect();

    Ok(Json(entries))
}

/// PUT /api/documents/{document}/pretty-name - Rename a document in the UI.
pub async fn set_pretty_name(
    State(state): State<SharedState>,
    Extension(AuthenticatedUser(username)): Extension<AuthenticatedUser>,
    Path(document): Path<String>,
    Json(req): Json<PrettyNameRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .set_pretty_name(&username, &document, req.pretty_name.trim())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
