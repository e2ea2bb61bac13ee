//! Document API endpoints.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{Document, DocumentStatus};
use crate::error::ServiceError;

use super::AppState;

/// List documents query parameters
#[derive(Deserialize)]
pub struct ListDocumentsParams {
    pub status: Option<String>,
}

/// List documents, optionally filtered by status
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDocumentsParams>,
) -> Result<Json<Vec<Document>>, ServiceError> {
    let documents = match params.status.as_deref() {
        Some(status) => state
            .service
            .list_documents_by_status(DocumentStatus::from_str(status))?,
        None => state.service.list_documents()?,
    };
    Ok(Json(documents))
}

/// Get a single document
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ServiceError> {
    let document =
        state
            .service
            .get_document(&id)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: id.clone(),
            })?;
    Ok(Json(document))
}

/// Upload a new document and submit it for processing
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Document>, ServiceError> {
    let mut file_data: Option<(Vec<u8>, String)> = None;
    let mut title: Option<String> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("document").to_string();
                let data = field.bytes().await.map_err(|e| {
                    ServiceError::InvalidRequest {
                        message: format!("failed to read upload: {}", e),
                    }
                })?;
                file_data = Some((data.to_vec(), file_name));
            }
            "title" => {
                title = field.text().await.ok();
            }
            _ => {}
        }
    }

    let Some((content, file_name)) = file_data else {
        return Err(ServiceError::InvalidRequest {
            message: "missing file field".to_string(),
        });
    };
    let title = title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| file_name.clone());

    let document = state
        .service
        .upload_document(&content, &file_name, &title)
        .await?;
    Ok(Json(document))
}

/// Submit (or re-submit) a document for processing
pub async fn submit_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ServiceError> {
    let document = state.service.submit_document(&id).await?;
    Ok(Json(document))
}
