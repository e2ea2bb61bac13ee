//! Document upload and submission.

use chrono::Utc;
use tracing::{info, warn};

use crate::db::{Document, DocumentStatus};
use crate::error::{ServiceError, ServiceResult};
use crate::queue::ProcessingJob;
use crate::service::ArchivistService;

impl ArchivistService {
    /// Store uploaded content, create a document record, and submit it for
    /// processing. The returned record is already `Queued`.
    pub async fn upload_document(
        &self,
        content: &[u8],
        file_name: &str,
        title: &str,
    ) -> ServiceResult<Document> {
        let document_id = uuid::Uuid::new_v4().to_string();
        let stored_path = self.storage.save(&document_id, file_name, content).await?;

        let now = Utc::now();
        let document = Document {
            id: document_id.clone(),
            title: title.to_string(),
            file_name: file_name.to_string(),
            file_path: Some(stored_path),
            status: DocumentStatus::Pending,
            retry_count: 0,
            processing_started_at: None,
            processing_completed_at: None,
            extracted_text: None,
            summary: None,
            document_type_name: None,
            document_type_category: None,
            tags: Vec::new(),
            processing_error: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_document(&document)?;

        info!(doc_id = %document_id, title = %title, "Document uploaded");

        self.submit_document(&document_id).await
    }

    /// Submit a document for processing.
    ///
    /// The record is persisted as `Queued` before the job is placed on the
    /// queue, so a producer re-reading the record never observes `Pending`.
    /// Submitting a document that is already `Queued` or `Processing` is
    /// rejected; a document must not be in more than one worker's custody.
    pub async fn submit_document(&self, document_id: &str) -> ServiceResult<Document> {
        let Some(mut document) = self.db.get_document(document_id)? else {
            return Err(ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            });
        };

        if matches!(
            document.status,
            DocumentStatus::Queued | DocumentStatus::Processing
        ) {
            return Err(ServiceError::InvalidRequest {
                message: format!(
                    "document {} is already {}",
                    document_id,
                    document.status.as_str()
                ),
            });
        }

        document.status = DocumentStatus::Queued;
        document.processing_error = None;
        let document = self.db.update_document(&document)?;

        if let Err(e) = self.queue.enqueue(ProcessingJob::new(document_id)) {
            // The record stays Queued; the startup recovery pass picks it up
            // on the next boot.
            warn!(doc_id = %document_id, error = %e, "Failed to enqueue submitted document");
            return Err(e);
        }

        info!(doc_id = %document_id, "Document queued for processing");
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{RoutingTransport, SharedRouting, build_service};

    #[tokio::test]
    async fn upload_leaves_record_queued_before_any_worker_runs() {
        let (_dir, service) = build_service(
            Box::new(SharedRouting(RoutingTransport::new())),
            2,
            None,
        );

        // No workers running: the status visible right after submit is the
        // one producers can observe.
        let uploaded = service
            .upload_document(b"total due: 42", "invoice.txt", "March invoice")
            .await
            .unwrap();
        assert_eq!(uploaded.status, DocumentStatus::Queued);

        let reread = service.get_document(&uploaded.id).unwrap().unwrap();
        assert_eq!(reread.status, DocumentStatus::Queued);
    }

    #[tokio::test]
    async fn submitting_a_queued_document_is_rejected() {
        let (_dir, service) = build_service(
            Box::new(SharedRouting(RoutingTransport::new())),
            2,
            None,
        );

        let uploaded = service
            .upload_document(b"text", "notes.txt", "Notes")
            .await
            .unwrap();

        let err = service.submit_document(&uploaded.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn submitting_unknown_document_is_not_found() {
        let (_dir, service) = build_service(
            Box::new(SharedRouting(RoutingTransport::new())),
            2,
            None,
        );

        let err = service.submit_document("missing").await.unwrap_err();
        assert!(matches!(err, ServiceError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails_but_leaves_record_queued() {
        let (_dir, service) = build_service(
            Box::new(SharedRouting(RoutingTransport::new())),
            2,
            None,
        );

        let uploaded = service
            .upload_document(b"text", "notes.txt", "Notes")
            .await
            .unwrap();
        // Reset to a submittable state, then close the queue.
        let mut doc = service.get_document(&uploaded.id).unwrap().unwrap();
        doc.status = DocumentStatus::Failed;
        service.db.update_document(&doc).unwrap();
        service.shutdown();

        assert!(service.submit_document(&uploaded.id).await.is_err());
        let reread = service.get_document(&uploaded.id).unwrap().unwrap();
        assert_eq!(reread.status, DocumentStatus::Queued);
    }
}
