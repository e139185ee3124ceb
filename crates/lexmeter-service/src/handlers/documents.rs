//! Document handlers.
//!
//! Recording a document is where a credit is actually spent. The gate is
//! checked before the insert but not atomically with it, so concurrent
//! requests from one user can each pass the check and overshoot the quota by
//! the number in flight.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use lexmeter_core::{Credits, DocumentId, DocumentRecord, Feature};

use crate::auth::AuthUser;
use crate::engine::gate;
use crate::error::ApiError;
use crate::state::AppState;

/// Maximum title length accepted.
const MAX_TITLE_CHARS: usize = 512;

/// Record document request.
#[derive(Debug, Default, Deserialize)]
pub struct RecordDocumentRequest {
    /// Original file name.
    #[serde(default)]
    pub title: Option<String>,
}

/// Record document response.
#[derive(Debug, Serialize)]
pub struct RecordDocumentResponse {
    /// The stored document.
    pub document: DocumentRecord,
    /// Analysis credits left after this document.
    pub remaining_credits: Credits,
}

/// Gate and record an analyzed document.
pub async fn record_document(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<RecordDocumentRequest>,
) -> Result<(StatusCode, Json<RecordDocumentResponse>), ApiError> {
    if body
        .title
        .as_ref()
        .is_some_and(|title| title.chars().count() > MAX_TITLE_CHARS)
    {
        return Err(ApiError::BadRequest(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }

    let now = state.clock.now();
    let decision = gate::decide(
        state.store.as_ref(),
        &auth.user_id,
        Feature::DocumentAnalysis,
        now,
    );
    if !decision.allowed {
        tracing::debug!(
            user_id = %auth.user_id,
            reason = ?decision.reason,
            "Document analysis denied"
        );
        return Err(ApiError::Denied(decision));
    }

    let document = DocumentRecord::new(auth.user_id, body.title, now);
    state.store.put_document(&document)?;

    let remaining_credits = match decision.remaining_credits {
        Credits::Remaining(left) => Credits::Remaining(left.saturating_sub(1)),
        Credits::Unlimited => Credits::Unlimited,
    };

    tracing::info!(
        user_id = %auth.user_id,
        document_id = %document.id,
        "Document recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(RecordDocumentResponse {
            document,
            remaining_credits,
        }),
    ))
}

/// Soft-delete one of the caller's documents.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentRecord>, ApiError> {
    let document_id: DocumentId = document_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid document ID".into()))?;

    // Other users' documents are indistinguishable from missing ones.
    let owned = state
        .store
        .get_document(&document_id)?
        .is_some_and(|document| document.user_id == auth.user_id);
    if !owned {
        return Err(ApiError::NotFound("Document not found".into()));
    }

    let document = state.store.delete_document(&document_id, state.clock.now())?;
    tracing::info!(user_id = %auth.user_id, document_id = %document_id, "Document deleted");
    Ok(Json(document))
}
