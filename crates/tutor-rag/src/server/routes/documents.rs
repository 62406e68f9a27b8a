//! Document management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingestion::IngestOutcome;
use crate::server::state::AppState;
use crate::storage::paginate;
use crate::types::{Document, DocumentFilter, DocumentMeta, DocumentUpdate, UserRole, Visibility};

use super::Caller;

/// Body of an ingestion request
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

/// Document listing
#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<Document>,
    pub total_count: usize,
}

fn visible(document: &Document, caller: &Caller) -> bool {
    document
        .visibility
        .is_visible_to(&document.owner_id, caller.role, &caller.user_id)
}

/// Fetch a document the caller may see; hidden documents read as missing
async fn load_visible(state: &AppState, id: &Uuid, caller: &Caller) -> Result<Document> {
    state
        .store()
        .get_document(id)
        .await?
        .filter(|document| visible(document, caller))
        .ok_or_else(|| Error::NotFound(format!("document {}", id)))
}

/// POST /api/documents - Ingest a document
pub async fn ingest_document(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestOutcome>)> {
    // Students only ever see public material, which is curated by staff
    if caller.role == UserRole::Student {
        return Err(Error::Forbidden("students cannot upload documents".into()));
    }

    tracing::info!(
        "Ingesting '{}' ({} bytes) for {}",
        request.title,
        request.text.len(),
        caller.user_id
    );

    let meta = DocumentMeta {
        title: request.title,
        subject: request.subject,
        grade_level: request.grade_level,
        visibility: request.visibility,
        owner_id: caller.user_id,
    };
    let outcome = state.pipeline().ingest(&request.text, meta).await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/documents - List documents visible to the caller
pub async fn list_documents(
    State(state): State<AppState>,
    caller: Caller,
    Query(filter): Query<DocumentFilter>,
) -> Result<Json<DocumentListResponse>> {
    let unpaged = DocumentFilter {
        limit: None,
        offset: 0,
        ..filter.clone()
    };

    let mut documents = state.store().list_documents(&unpaged).await?;
    documents.retain(|document| visible(document, &caller));

    let total_count = documents.len();
    let documents = paginate(documents, filter.offset, filter.limit);

    Ok(Json(DocumentListResponse {
        documents,
        total_count,
    }))
}

/// GET /api/documents/:id - Get a specific document
pub async fn get_document(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>> {
    Ok(Json(load_visible(&state, &id, &caller).await?))
}

/// PATCH /api/documents/:id - Edit document metadata
pub async fn update_document(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(update): Json<DocumentUpdate>,
) -> Result<Json<Document>> {
    let document = load_visible(&state, &id, &caller).await?;
    if !caller.can_manage(&document.owner_id) {
        return Err(Error::Forbidden(format!("document {} belongs to another user", id)));
    }

    let updated = state
        .pipeline()
        .update_document(&id, &update)
        .await?
        .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;

    Ok(Json(updated))
}

/// DELETE /api/documents/:id - Delete a document and its chunks
pub async fn delete_document(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let document = load_visible(&state, &id, &caller).await?;
    if !caller.can_manage(&document.owner_id) {
        return Err(Error::Forbidden(format!("document {} belongs to another user", id)));
    }

    let deleted = state.pipeline().delete_document(&id).await?;

    tracing::info!("Deleted document '{}' ({} chunks)", document.title, document.chunk_count);

    Ok(Json(serde_json::json!({
        "success": deleted,
        "document_id": id,
        "title": document.title,
        "deleted_chunks": document.chunk_count,
    })))
}
