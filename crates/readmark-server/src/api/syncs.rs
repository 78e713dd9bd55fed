// ABOUTME: Progress sync handlers speaking the KOReader sync wire format.
// ABOUTME: Devices push their reading position per document and pull the latest one back.

use axum::Json;
use axum::extract::{Extension, Path, State};
use readmark_core::{Document, ProgressUpdate};
use serde::Serialize;

use crate::api::ApiError;
use crate::app_state::SharedState;
use crate::auth::AuthenticatedUser;

/// Response body after storing progress.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub document: String,
    pub timestamp: i64,
}

/// Stored progress as devices expect it.
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub document: String,
    pub progress: String,
    pub percentage: f32,
    pub device: String,
    pub device_id: String,
    pub timestamp: i64,
}

impl From<Document> for ProgressResponse {
    fn from(doc: Document) -> Self {
        Self {
            document: doc.document_id,
            progress: doc.progress,
            percentage: doc.percentage,
            device: doc.device,
            device_id: doc.device_id,
            timestamp: doc.timestamp,
        }
    }
}

/// PUT /syncs/progress - Store the caller's position in a document.
pub async fn update_progress(
    State(state): State<SharedState>,
    Extension(AuthenticatedUser(username)): Extension<AuthenticatedUser>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<SyncResponse>, ApiError> {
    if update.document.is_empty() {
        return Err(ApiError::BadRequest("document is required"));
    }
    tracing::debug!(user = %username, document = %update.document, device = %update.device, "progress update");

    let doc = state.store.upsert_document(&username, update).await?;

    Ok(Json(SyncResponse {
        document: doc.document_id,
        timestamp: doc.timestamp,
    }))
}

/// GET /syncs/progress/{document} - Latest stored position for a document.
pub async fn get_progress(
    State(state): State<SharedState>,
    Extension(AuthenticatedUser(username)): Extension<AuthenticatedUser>,
    Path(document): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let doc = state.store.get_document(&username, &document).await?;
    Ok(Json(doc.into()))
}
